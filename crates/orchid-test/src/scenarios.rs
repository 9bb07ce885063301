//! Scenario models
//!
//! Small complete models shared by tests, benches and demos:
//! - a modulo-8 counter
//! - a countdown bomb with a guarded defuse rule
//! - two counters on two clocks, one of them nested
//! - a reorder-buffer reference model and a LIFO implementation of it
//! - flat and union-shaped models for hash fuzzing

use rand::rngs::StdRng;

use orchid_core::{LeafKind, OrchidError, OrchidResult, RuleId, Value};
use orchid_runtime::{Model, ModelBuilder, ParamDecl, RulePolicy};
use orchid_state::PortDirection;
use orchid_time::ClockClient;
use orchid_verify::{PortFeed, TraceReplay};

/// `top.count`, modulo 8, and one `increment` rule that prints the new value
pub fn counter_mod8() -> OrchidResult<Model> {
    let mut b = ModelBuilder::new("top");
    let root = b.root();
    b.tree()
        .add_cell(root, "count", LeafKind::modulo(8), Some(Value::Int(0)))?;
    b.rule(root, "increment", vec![], |t, _| {
        let count = t.cell("count")?;
        let v = t.read_int(count)?;
        t.write(count, v + 1)?;
        let shown = t.read_int(count)?;
        t.print(shown.to_string());
        Ok(())
    })?;
    b.build()
}

pub const BOMB_PHASES: [&str; 3] = ["Counting", "Exploded", "Safe"];

/// Countdown bomb
///
/// `countdown` always applies while counting; `defuse` only in the last
/// three ticks; `arm` never applies once the bomb is built. Both terminal
/// phases deadlock the model.
pub fn bomb(start: i64) -> OrchidResult<Model> {
    let phase_kind = LeafKind::enumeration("Phase", &BOMB_PHASES);
    let counting = Value::Enum(0);

    let mut b = ModelBuilder::new("bomb");
    let root = b.root();
    b.tree().add_cell(root, "phase", phase_kind, Some(counting))?;
    b.tree()
        .add_cell(root, "count", LeafKind::range(0, start + 1), Some(Value::Int(start)))?;

    b.rule(root, "arm", vec![], move |t, _| {
        let count = t.cell("count")?;
        t.guard(t.read_int(count)? > start)?;
        let phase = t.cell("phase")?;
        t.write(phase, Value::Enum(0))
    })?;
    b.rule(root, "countdown", vec![], |t, _| {
        let phase = t.cell("phase")?;
        t.guard(t.read_enum(phase)? == 0)?;
        let count = t.cell("count")?;
        let v = t.read_int(count)?;
        if v == 0 {
            t.print("BOOM");
            t.write(phase, Value::Enum(1))
        } else {
            t.print(format!("tick {}", v - 1));
            t.write(count, v - 1)
        }
    })?;
    b.rule(root, "defuse", vec![], |t, _| {
        let phase = t.cell("phase")?;
        t.guard(t.read_enum(phase)? == 0)?;
        let count = t.cell("count")?;
        t.guard(t.read_int(count)? <= 3)?;
        t.print("defused");
        t.write(phase, Value::Enum(2))
    })?;
    b.build()
}

/// Always picks the rules of one handler
///
/// Pointed at a rule that always guards, every random pick misses and the
/// simulator must fall back to its exhaustive probe.
#[derive(Clone, Debug)]
pub struct FixedPolicy {
    handler: String,
    target: Option<RuleId>,
}

impl FixedPolicy {
    pub fn new(handler: &str) -> Self {
        FixedPolicy {
            handler: handler.to_string(),
            target: None,
        }
    }
}

impl RulePolicy for FixedPolicy {
    fn make_pool(&mut self, model: &Model, rules: &[RuleId]) -> Vec<RuleId> {
        self.target = rules
            .iter()
            .copied()
            .find(|&id| model.rule(id).is_ok_and(|r| r.handler_name() == self.handler));
        rules.to_vec()
    }

    fn choose(&mut self, _pool: &[RuleId], _rng: &mut StdRng) -> Option<RuleId> {
        self.target
    }
}

/// Two counters on two clocks
///
/// `top.clk` drives `increment_counter`, `check_counter` and the nested
/// `top.sub.clk_a`; `top.sub.clk_b` is scheduled on its own.
pub fn dual_clock() -> OrchidResult<Model> {
    let mut b = ModelBuilder::new("top");
    let root = b.root();
    let sub = b.tree().add_node(root, "sub")?;
    b.tree()
        .add_cell(root, "counter", LeafKind::unbounded(), Some(Value::Int(0)))?;
    b.tree()
        .add_cell(sub, "counter_a", LeafKind::unbounded(), Some(Value::Int(0)))?;
    b.tree()
        .add_cell(sub, "counter_b", LeafKind::unbounded(), Some(Value::Int(0)))?;

    let increment_a = b.clocked(sub, "increment_a", vec![], |t, _| {
        let c = t.cell("counter_a")?;
        let v = t.read_int(c)?;
        t.write(c, v + 1)
    })?;
    let increment_b = b.clocked(sub, "increment_b", vec![], |t, _| {
        let c = t.cell("counter_b")?;
        let v = t.read_int(c)?;
        t.write(c, v + 1)
    })?;
    let clk_a = b.clock(sub, "clk_a", vec![ClockClient::Handler(increment_a)])?;
    b.clock(sub, "clk_b", vec![ClockClient::Handler(increment_b)])?;

    let increment = b.clocked(root, "increment_counter", vec![], |t, _| {
        let c = t.cell("counter")?;
        let v = t.read_int(c)?;
        t.write(c, v + 1)
    })?;
    // both counters move on the same edge, so pre-edge values agree
    let check = b.clocked(root, "check_counter", vec![], |t, _| {
        let top = t.cell("counter")?;
        let nested = t.cell("sub.counter_a")?;
        let (top, nested) = (t.read_int(top)?, t.read_int(nested)?);
        t.ensure(top == nested, "top.counter and top.sub.counter_a diverged")
    })?;
    b.clock(
        root,
        "clk",
        vec![
            ClockClient::Handler(increment),
            ClockClient::Clock(clk_a),
            ClockClient::Handler(check),
        ],
    )?;
    b.build()
}

/// Reorder-buffer reference model over ids `0..ids`
///
/// `accept` takes a request id from `rob.req`; `complete(id)` retires a
/// pending id and must reproduce the next value observed on `rob.comp`.
/// Completions may come back in any order.
pub fn reorder_reference(ids: i64) -> OrchidResult<Model> {
    let id_kind = LeafKind::bounded(ids);
    let mut b = ModelBuilder::new("rob");
    let root = b.root();
    b.tree()
        .add_port(root, "req", PortDirection::Stimulus, id_kind.clone())?;
    b.tree()
        .add_port(root, "comp", PortDirection::Observed, id_kind.clone())?;
    for id in 0..ids {
        b.tree().add_cell(
            root,
            &format!("pending_{}", id),
            LeafKind::Boolean,
            Some(Value::Bool(false)),
        )?;
    }
    b.rule(root, "accept", vec![], |t, _| {
        let req = t.port("req")?;
        let id = t.pop(req)?;
        let pending = t.cell(&format!("pending_{}", id))?;
        t.guard(!t.read_bool(pending)?)?;
        t.write(pending, true)
    })?;
    b.rule(root, "complete", vec![ParamDecl::new("id", id_kind)], |t, args| {
        let id = args.int("id")?;
        let pending = t.cell(&format!("pending_{}", id))?;
        t.guard(t.read_bool(pending)?)?;
        let comp = t.port("comp")?;
        t.emit(comp, id)?;
        t.write(pending, false)
    })?;
    b.build()
}

/// Scripted trace: all requests first, then all completions
pub fn reorder_trace(requests: &[i64], completions: &[i64]) -> TraceReplay {
    let mut trace = TraceReplay::new();
    for &id in requests {
        trace.push_step(vec![("rob.req", id)]);
    }
    for &id in completions {
        trace.push_step(vec![("rob.comp", id)]);
    }
    trace
}

/// Pending ids of a reorder reference model
pub fn open_requests(model: &Model) -> OrchidResult<Vec<i64>> {
    let mut open = Vec::new();
    let mut id = 0;
    while let Ok(cell) = model.tree().lookup_cell(&format!("rob.pending_{}", id)) {
        if model.tree().read(cell)?.as_bool() == Some(true) {
            open.push(id);
        }
        id += 1;
    }
    Ok(open)
}

/// Clocked implementation that completes requests last-in first-out
///
/// Each cycle it issues the next id (1, 2, ... `requests`) while fewer than
/// two are in flight, and otherwise completes the most recent one. Issued
/// and completed ids show up on `req_id`/`comp_id` with a valid flag for
/// that cycle.
pub fn lifo_implementation(requests: i64) -> OrchidResult<Model> {
    let ids = LeafKind::bounded(requests + 1);
    let mut b = ModelBuilder::new("dut");
    let root = b.root();
    let slots = b.tree().add_node(root, "slots")?;
    for slot in 0..2 {
        b.tree()
            .add_cell(slots, &slot.to_string(), ids.clone(), Some(Value::Int(0)))?;
    }
    b.tree()
        .add_cell(root, "depth", LeafKind::bounded(3), Some(Value::Int(0)))?;
    b.tree()
        .add_cell(root, "issued", ids.clone(), Some(Value::Int(0)))?;
    b.tree()
        .add_cell(root, "req_valid", LeafKind::Boolean, Some(Value::Bool(false)))?;
    b.tree().add_cell(root, "req_id", ids.clone(), Some(Value::Int(0)))?;
    b.tree()
        .add_cell(root, "comp_valid", LeafKind::Boolean, Some(Value::Bool(false)))?;
    b.tree().add_cell(root, "comp_id", ids, Some(Value::Int(0)))?;

    let cycle = b.clocked(root, "cycle", vec![], move |t, _| {
        let (depth, issued) = (t.cell("depth")?, t.cell("issued")?);
        let (req_valid, comp_valid) = (t.cell("req_valid")?, t.cell("comp_valid")?);
        let d = t.read_int(depth)?;
        let n = t.read_int(issued)?;
        t.write(req_valid, false)?;
        t.write(comp_valid, false)?;
        if d < 2 && n < requests {
            let slot = t.cell(&format!("slots.{}", d))?;
            let req_id = t.cell("req_id")?;
            t.write(slot, n + 1)?;
            t.write(issued, n + 1)?;
            t.write(depth, d + 1)?;
            t.write(req_id, n + 1)?;
            t.write(req_valid, true)?;
        } else if d > 0 {
            let slot = t.cell(&format!("slots.{}", d - 1))?;
            let comp_id = t.cell("comp_id")?;
            let id = t.read_int(slot)?;
            t.write(depth, d - 1)?;
            t.write(comp_id, id)?;
            t.write(comp_valid, true)?;
        }
        Ok(())
    })?;
    b.clock(root, "clk", vec![ClockClient::Handler(cycle)])?;
    b.build()
}

/// Copy one cycle of [`lifo_implementation`] outputs onto a reorder
/// reference model's ports
pub fn sample_lifo(dut: &Model, feed: &mut PortFeed<'_>) -> OrchidResult<()> {
    let tree = dut.tree();
    let flag = |name: &str| -> OrchidResult<bool> {
        let cell = tree.lookup_cell(name)?;
        Ok(tree.read(cell)?.as_bool() == Some(true))
    };
    let id = |name: &str| -> OrchidResult<Value> {
        let cell = tree.lookup_cell(name)?;
        Ok(tree.read(cell)?.clone())
    };
    if flag("dut.req_valid")? {
        feed.push_path("rob.req", id("dut.req_id")?)?;
    }
    if flag("dut.comp_valid")? {
        feed.push_path("rob.comp", id("dut.comp_id")?)?;
    }
    Ok(())
}

/// Three integer cells `a`, `b`, `c` in `0..16` and `set(which, v)` rules
pub fn three_ints() -> OrchidResult<Model> {
    let mut b = ModelBuilder::new("top");
    let root = b.root();
    for name in ["a", "b", "c"] {
        b.tree()
            .add_cell(root, name, LeafKind::bounded(16), Some(Value::Int(0)))?;
    }
    b.rule(
        root,
        "set",
        vec![
            ParamDecl::new("which", LeafKind::bounded(3)),
            ParamDecl::new("v", LeafKind::bounded(16)),
        ],
        |t, args| {
            let name = ["a", "b", "c"][args.int("which")? as usize];
            let cell = t.cell(name)?;
            t.guard(t.read_int(cell)? != args.int("v")?)?;
            t.write(cell, args.int("v")?)
        },
    )?;
    b.build()
}

/// A union `shape` with `circle.radius` and `square.side` options
///
/// Switching options keeps the deselected option's value, so states that
/// differ only in a hidden option still hash differently.
pub fn shapes() -> OrchidResult<Model> {
    let mut b = ModelBuilder::new("top");
    let root = b.root();
    let shape = b.tree().add_union(root, "shape", &["circle", "square"], 0)?;
    let (circle, square) = match shape.options.as_slice() {
        [circle, square] => (*circle, *square),
        _ => return Err(OrchidError::InvalidConfig("shape needs two options".into())),
    };
    b.tree()
        .add_cell(circle, "radius", LeafKind::bounded(8), Some(Value::Int(1)))?;
    b.tree()
        .add_cell(square, "side", LeafKind::bounded(8), Some(Value::Int(1)))?;

    b.rule(
        root,
        "select",
        vec![ParamDecl::new("option", LeafKind::bounded(2))],
        |t, args| {
            let shape = t.node("shape")?;
            let option = args.int("option")? as usize;
            t.guard(t.selected(shape)? != option)?;
            t.select(shape, option)
        },
    )?;
    b.rule(
        root,
        "grow",
        vec![ParamDecl::new("by", LeafKind::range(1, 3))],
        |t, args| {
            let shape = t.node("shape")?;
            let cell = match t.selected(shape)? {
                0 => t.cell("shape.circle.radius")?,
                _ => t.cell("shape.square.side")?,
            };
            let grown = t.read_int(cell)? + args.int("by")?;
            t.guard(grown < 8)?;
            t.write(cell, grown)
        },
    )?;
    b.rule(root, "shrink", vec![], |t, _| {
        let shape = t.node("shape")?;
        let cell = match t.selected(shape)? {
            0 => t.cell("shape.circle.radius")?,
            _ => t.cell("shape.square.side")?,
        };
        let v = t.read_int(cell)?;
        t.guard(v > 0)?;
        t.write(cell, v - 1)
    })?;
    b.build()
}
