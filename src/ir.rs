//! Tree-shaped intermediate representation
//!
//! Every stage of the pipeline after the parser consumes and produces one
//! `Vec<Node>`.  A `Loop` owns its children, so dropping a tree releases
//! everything below it, and the derived equality is structural, which is
//! what the optimizer's fixed-point driver compares with.
//!
//! `Zero` and `Add` never come out of the parser, they are introduced by
//! the loop-rewriting passes and the emitter knows how to lower them.

/// One IR node.  Arithmetic payloads are signed so that `Add` can carry a
/// leftward (negative) tape displacement.
#[derive(Clone,Debug,PartialEq,Eq)]
pub enum Node {
    /// parse failure sentinel, fatal if it reaches the emitter
    Error,
    /// add to the current cell, mod 256
    Incr(i32),
    /// subtract from the current cell, mod 256
    Decr(i32),
    /// move the tape pointer left
    Left(i32),
    /// move the tape pointer right
    Right(i32),
    /// write the current cell to the host
    Output,
    /// read one byte from the host into the current cell
    Input,
    /// run the children while the current cell is non-zero
    Loop(Vec<Node>),
    /// store 0 into the current cell
    Zero,
    /// add the current cell into the cell at the given displacement
    Add(i32),
}

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const MAGENTA: &str = "\x1b[35m";
const CYAN: &str = "\x1b[36m";
const BRIGHT_GRAY: &str = "\x1b[37m";
const BRIGHT_RED: &str = "\x1b[91m";
const BRIGHT_YELLOW: &str = "\x1b[93m";

fn bracket_color(depth: usize) -> &'static str {
    match depth % 3 {
        0 => BRIGHT_YELLOW,
        1 => MAGENTA,
        _ => CYAN,
    }
}

/// Render a whole tree as one ANSI-colored line, bracket colors cycling
/// with nesting depth.
pub fn render(nodes: &[Node]) -> String {
    let mut acc = String::new();
    render_seq(nodes,&mut acc,0);
    acc
}

fn render_seq(nodes: &[Node],acc: &mut String,depth: usize) {
    acc.push_str(BOLD);
    acc.push_str(bracket_color(depth));
    acc.push('[');
    acc.push_str(RESET);
    for (i,node) in nodes.iter().enumerate() {
        if i != 0 {
            acc.push(' ');
        }
        render_node(node,acc,depth + 1);
    }
    acc.push_str(BOLD);
    acc.push_str(bracket_color(depth));
    acc.push(']');
    acc.push_str(RESET);
}

fn render_value(value: i32,acc: &mut String,depth: usize) {
    acc.push_str(BOLD);
    acc.push_str(bracket_color(depth));
    acc.push('(');
    acc.push_str(RESET);
    acc.push_str(&value.to_string());
    acc.push_str(BOLD);
    acc.push_str(bracket_color(depth));
    acc.push(')');
    acc.push_str(RESET);
}

fn render_name(name: &str,color: &str,acc: &mut String) {
    acc.push_str(color);
    acc.push_str(name);
    acc.push_str(RESET);
}

fn render_node(node: &Node,acc: &mut String,depth: usize) {
    match node {
        Node::Error => render_name("Error",BRIGHT_RED,acc),
        Node::Incr(n) => {
            render_name("Incr",YELLOW,acc);
            render_value(*n,acc,depth);
        },
        Node::Decr(n) => {
            render_name("Decr",YELLOW,acc);
            render_value(*n,acc,depth);
        },
        Node::Left(n) => {
            render_name("Left",GREEN,acc);
            render_value(*n,acc,depth);
        },
        Node::Right(n) => {
            render_name("Right",GREEN,acc);
            render_value(*n,acc,depth);
        },
        Node::Output => render_name("Output",BRIGHT_GRAY,acc),
        Node::Input => render_name("Input",BRIGHT_GRAY,acc),
        Node::Loop(body) => {
            acc.push_str(BRIGHT_RED);
            acc.push_str("Loop");
            render_seq(body,acc,depth);
            acc.push_str(RESET);
        },
        Node::Zero => render_name("Zero",YELLOW,acc),
        Node::Add(n) => {
            render_name("Add",YELLOW,acc);
            render_value(*n,acc,depth);
        },
    }
}

#[test]
fn equality_is_structural() {
    let a = Node::Loop(vec![Node::Incr(1),Node::Loop(vec![Node::Decr(2)])]);
    let b = Node::Loop(vec![Node::Incr(1),Node::Loop(vec![Node::Decr(2)])]);
    let c = Node::Loop(vec![Node::Incr(1),Node::Loop(vec![Node::Decr(3)])]);
    assert_eq!(a,b);
    assert_ne!(a,c);
    assert_ne!(Node::Incr(1),Node::Decr(1));
    assert_ne!(Node::Output,Node::Input);
}

#[test]
fn render_names_every_variant() {
    let tree = vec![
        Node::Incr(42),
        Node::Loop(vec![Node::Right(2),Node::Output]),
        Node::Zero,
        Node::Add(-7),
    ];
    let text = render(&tree);
    for name in ["Incr","Loop","Right","Output","Zero","Add","42","-7"] {
        assert!(text.contains(name),"missing {} in {}",name,text);
    }
}
