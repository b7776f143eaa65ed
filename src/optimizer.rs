//! Fixed-point tree rewriting
//!
//! Five rewrites run in a fixed order until one full cycle leaves the tree
//! structurally unchanged.  Every pass is a pure function from one tree to
//! a fresh one, recursing into `Loop` bodies and copying whatever its rule
//! does not touch, so ownership moves hand over hand through the driver
//! and the superseded tree drops at each rebind.
//!
//! * `fold_adjacent`        `[A(n1) A(n2)]` -> `[A(n1+n2)]`
//! * `eliminate_negation`   `[A(n1) B(n2)]` -> the surplus side, for
//!   opposing pairs like `Incr`/`Decr` and `Left`/`Right`
//! * `eliminate_overflow`   payloads above 255 wrap to `n % 256`
//! * `replace_zeroing_loops` `Loop[Incr(n)]`/`Loop[Decr(n)]` with odd `n`
//!   -> `Zero`
//! * `replace_copying_loops` `Loop[Right(n) Incr(1) Left(n) Decr(1)]`
//!   -> `Add(n) Zero`, and mirrored for `Left` first
//!
//! A zeroing loop needs an odd payload: the cell is 8-bit, so the loop is
//! guaranteed to hit zero only when the per-iteration delta is coprime
//! with 256, and for a power of two that means odd.  The same argument
//! lets the copy rewrite keep unit deltas only.

use crate::ir::Node;

/// Run the whole suite to a fixed point.
pub fn optimize(mut tree: Vec<Node>) -> Vec<Node> {
    let mut cycles = 0;
    loop {
        let next = replace_copying_loops(&replace_zeroing_loops(
            &eliminate_overflow(&eliminate_negation(&fold_adjacent(&tree))),
        ));
        cycles += 1;
        if next == tree {
            break;
        }
        tree = next;
    }
    log::debug!("optimizer reached a fixed point after {} cycles",cycles);
    tree
}

/// Coalesce runs of same-variant arithmetic siblings.
pub fn fold_adjacent(vec: &[Node]) -> Vec<Node> {
    let mut out = Vec::new();
    let mut iter = vec.iter();
    let mut pending = match iter.next() {
        Some(node) => fold_node(node),
        None => return out,
    };
    for node in iter {
        let next = fold_node(node);
        pending = match (pending,next) {
            (Node::Incr(a),Node::Incr(b)) => Node::Incr(a + b),
            (Node::Decr(a),Node::Decr(b)) => Node::Decr(a + b),
            (Node::Left(a),Node::Left(b)) => Node::Left(a + b),
            (Node::Right(a),Node::Right(b)) => Node::Right(a + b),
            (done,next) => {
                out.push(done);
                next
            }
        };
    }
    out.push(pending);
    out
}

fn fold_node(node: &Node) -> Node {
    match node {
        Node::Loop(body) => Node::Loop(fold_adjacent(body)),
        other => other.clone(),
    }
}

/// Cancel an opposing pair at the tail of the output.  Looking one pair
/// back after each append means a triple is not collapsed in one sweep,
/// the driver picks up the rest on the next cycle.
pub fn eliminate_negation(vec: &[Node]) -> Vec<Node> {
    let mut out = Vec::new();
    for node in vec {
        match node {
            Node::Loop(body) => out.push(Node::Loop(eliminate_negation(body))),
            other => out.push(other.clone()),
        }
        cancel_tail(&mut out);
    }
    out
}

fn surplus(a: i32,b: i32,first: fn(i32) -> Node,second: fn(i32) -> Node) -> Option<Node> {
    if a > b {
        Some(first(a - b))
    } else if a < b {
        Some(second(b - a))
    } else {
        None
    }
}

fn cancel_tail(out: &mut Vec<Node>) {
    let len = out.len();
    if len < 2 {
        return;
    }
    let merged = match (&out[len - 2],&out[len - 1]) {
        (Node::Incr(a),Node::Decr(b)) => surplus(*a,*b,Node::Incr,Node::Decr),
        (Node::Decr(a),Node::Incr(b)) => surplus(*a,*b,Node::Decr,Node::Incr),
        (Node::Left(a),Node::Right(b)) => surplus(*a,*b,Node::Left,Node::Right),
        (Node::Right(a),Node::Left(b)) => surplus(*a,*b,Node::Right,Node::Left),
        _ => return,
    };
    out.truncate(len - 2);
    if let Some(node) = merged {
        out.push(node);
    }
}

/// Wrap arithmetic payloads above 255 back into cell range.
pub fn eliminate_overflow(vec: &[Node]) -> Vec<Node> {
    vec.iter().map(overflow_node).collect()
}

fn overflow_node(node: &Node) -> Node {
    match node {
        Node::Loop(body) => Node::Loop(eliminate_overflow(body)),
        Node::Incr(n) if *n > 255 => Node::Incr(n % 256),
        Node::Decr(n) if *n > 255 => Node::Decr(n % 256),
        Node::Left(n) if *n > 255 => Node::Left(n % 256),
        Node::Right(n) if *n > 255 => Node::Right(n % 256),
        other => other.clone(),
    }
}

/// Replace `Loop[Incr(n)]` and `Loop[Decr(n)]`, odd `n`, with `Zero`.
pub fn replace_zeroing_loops(vec: &[Node]) -> Vec<Node> {
    vec.iter().map(zeroing_node).collect()
}

fn zeroing_node(node: &Node) -> Node {
    match node {
        Node::Loop(body) => match body.as_slice() {
            [Node::Incr(n)] | [Node::Decr(n)] if n % 2 != 0 => Node::Zero,
            _ => Node::Loop(replace_zeroing_loops(body)),
        },
        other => other.clone(),
    }
}

/// Replace the four-node copy idiom with `Add` plus `Zero`.  The two
/// pointer moves must carry the same distance and the cell deltas must
/// both be one.
pub fn replace_copying_loops(vec: &[Node]) -> Vec<Node> {
    let mut out = Vec::new();
    for node in vec {
        match node {
            Node::Loop(body) => match body.as_slice() {
                [Node::Right(n),Node::Incr(1),Node::Left(m),Node::Decr(1)] if n == m => {
                    out.push(Node::Add(*n));
                    out.push(Node::Zero);
                }
                [Node::Left(n),Node::Incr(1),Node::Right(m),Node::Decr(1)] if n == m => {
                    out.push(Node::Add(-*n));
                    out.push(Node::Zero);
                }
                _ => out.push(Node::Loop(replace_copying_loops(body))),
            },
            other => out.push(other.clone()),
        }
    }
    out
}

#[cfg(test)]
use crate::parser::parse_slice;

/// Reference evaluator for checking that rewrites preserve behavior.
/// Cells wrap at 256 and loops test the cell before every iteration.
#[cfg(test)]
struct Machine {
    tape: Vec<u8>,
    pos: usize,
    input: std::collections::VecDeque<u8>,
    output: Vec<u8>,
}

#[cfg(test)]
impl Machine {
    fn create(input: &[u8]) -> Self {
        Self {
            tape: vec![0;256],
            pos: 0,
            input: input.iter().copied().collect(),
            output: Vec::new(),
        }
    }
    fn eval(&mut self,nodes: &[Node]) {
        for node in nodes {
            match node {
                Node::Error => panic!("evaluated an error node"),
                Node::Incr(n) => self.tape[self.pos] = self.tape[self.pos].wrapping_add(*n as u8),
                Node::Decr(n) => self.tape[self.pos] = self.tape[self.pos].wrapping_sub(*n as u8),
                Node::Left(n) => self.pos -= *n as usize,
                Node::Right(n) => self.pos += *n as usize,
                Node::Output => self.output.push(self.tape[self.pos]),
                Node::Input => {
                    self.tape[self.pos] = self.input.pop_front().unwrap_or(0xff);
                }
                Node::Loop(body) => {
                    while self.tape[self.pos] != 0 {
                        self.eval(body);
                    }
                }
                Node::Zero => self.tape[self.pos] = 0,
                Node::Add(offset) => {
                    let target = (self.pos as i64 + *offset as i64) as usize;
                    self.tape[target] = self.tape[target].wrapping_add(self.tape[self.pos]);
                }
            }
        }
    }
}

#[cfg(test)]
fn run_tree(nodes: &[Node],input: &[u8]) -> (Vec<u8>,Vec<u8>) {
    let mut machine = Machine::create(input);
    machine.eval(nodes);
    (machine.output,machine.tape)
}

#[test]
fn folds_runs_and_recurses() {
    let tree = parse_slice(b"+++>>[--<<]");
    assert_eq!(fold_adjacent(&tree),vec![
        Node::Incr(3),
        Node::Right(2),
        Node::Loop(vec![Node::Decr(2),Node::Left(2)]),
    ]);
}

#[test]
fn fold_is_idempotent() {
    let tree = parse_slice(b"++-->><<[+++[>>]]..,");
    let once = fold_adjacent(&tree);
    assert_eq!(fold_adjacent(&once),once);
}

#[test]
fn negation_cancels_pairs() {
    assert_eq!(
        eliminate_negation(&[Node::Incr(2),Node::Decr(3)]),
        vec![Node::Decr(1)]
    );
    assert_eq!(
        eliminate_negation(&[Node::Right(4),Node::Left(4)]),
        Vec::<Node>::new()
    );
    assert_eq!(
        eliminate_negation(&[Node::Left(5),Node::Right(2),Node::Output]),
        vec![Node::Left(3),Node::Output]
    );
}

#[test]
fn negation_never_grows_the_tree() {
    let trees = [
        parse_slice(b"+-+-+-"),
        parse_slice(b"<><>>><<"),
        parse_slice(b"[+-]>.<[-+]"),
    ];
    for tree in &trees {
        assert!(eliminate_negation(tree).len() <= tree.len());
    }
}

#[test]
fn overflow_wraps_payloads() {
    let tree = vec![Node::Incr(300),Node::Loop(vec![Node::Right(256)]),Node::Decr(255)];
    assert_eq!(eliminate_overflow(&tree),vec![
        Node::Incr(44),
        Node::Loop(vec![Node::Right(0)]),
        Node::Decr(255),
    ]);
}

#[test]
fn zeroing_needs_an_odd_payload() {
    assert_eq!(replace_zeroing_loops(&[Node::Loop(vec![Node::Decr(1)])]),vec![Node::Zero]);
    assert_eq!(replace_zeroing_loops(&[Node::Loop(vec![Node::Incr(3)])]),vec![Node::Zero]);
    // an even delta can miss zero entirely on a wrapping cell
    let even = vec![Node::Loop(vec![Node::Decr(2)])];
    assert_eq!(replace_zeroing_loops(&even),even);
}

#[test]
fn copy_loops_become_add_zero() {
    let right = vec![Node::Loop(vec![
        Node::Right(2),Node::Incr(1),Node::Left(2),Node::Decr(1),
    ])];
    assert_eq!(replace_copying_loops(&right),vec![Node::Add(2),Node::Zero]);
    let left = vec![Node::Loop(vec![
        Node::Left(1),Node::Incr(1),Node::Right(1),Node::Decr(1),
    ])];
    assert_eq!(replace_copying_loops(&left),vec![Node::Add(-1),Node::Zero]);
    // mismatched distances or non-unit deltas stay a loop
    let skewed = vec![Node::Loop(vec![
        Node::Right(2),Node::Incr(1),Node::Left(3),Node::Decr(1),
    ])];
    assert_eq!(replace_copying_loops(&skewed),skewed);
    let doubled = vec![Node::Loop(vec![
        Node::Right(1),Node::Incr(2),Node::Left(1),Node::Decr(2),
    ])];
    assert_eq!(replace_copying_loops(&doubled),doubled);
}

#[test]
fn optimize_reaches_known_shapes() {
    // the copy idiom plus its own cleanup
    assert_eq!(optimize(parse_slice(b"[>+<-]")),vec![Node::Add(1),Node::Zero]);
    // nothing to do
    assert_eq!(optimize(parse_slice(b"+>+<-")),vec![
        Node::Incr(1),Node::Right(1),Node::Incr(1),Node::Left(1),Node::Decr(1),
    ]);
    // a zeroing loop inside a folded program
    assert_eq!(optimize(parse_slice(b"+++[-]")),vec![Node::Incr(3),Node::Zero]);
}

#[test]
fn optimize_preserves_behavior() {
    let programs: [&[u8];4] = [
        b"++++++++[>++++++++<-]>+.",
        b"+++[->+<]>.",
        b",+.,-.",
        b"+++++[>+++<-]>[<+>-]<.",
    ];
    for source in programs {
        let tree = parse_slice(source);
        let optimized = optimize(tree.clone());
        assert_eq!(run_tree(&tree,b"AB"),run_tree(&optimized,b"AB"),
            "behavior changed for {}",String::from_utf8_lossy(source));
    }
}

#[test]
fn optimize_terminates_on_pathological_input() {
    let tree = parse_slice(&b"+-".repeat(300).into_iter().chain(*b"[<><>]").collect::<Vec<u8>>());
    // fixed point exists and is small
    assert!(optimize(tree).len() <= 1);
}
