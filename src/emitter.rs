//! x86-64 code emission
//!
//! Lowers an optimized tree straight into a caller-provided buffer as
//! System-V AMD64 machine code.  The generated function receives the tape
//! base in `rdi`, keeps the tape pointer in `rbx` for its whole lifetime,
//! and clobbers only `rax` and `edi` as scratch.  Host I/O goes through
//! absolute 64-bit addresses handed to [`Emitter::create`], materialized
//! with `movabs rax, imm64` followed by `call rax`, so relocating the
//! code buffer is harmless but the image is tied to the host process.
//!
//! Two single-flag micro-optimizations ride along during emission:
//!
//! * `cmp_flags_set` records that the byte most recently stored through
//!   `[rbx]` left ZF describing the new cell value, letting a loop close
//!   without its own `cmp byte [rbx], 0`.
//! * `rax_contains_copy` records that `rax` already holds the current
//!   cell zero-extended, letting back-to-back `Add` nodes share one load.
//!
//! Backward branches pick `jne rel8` when the body is short enough and
//! `jne rel32` otherwise.  The displacement is measured from the byte
//! after the jump, hence the `-2` and `-6` corrections for the two
//! encodings.

use crate::ir::Node;
use crate::Error;

pub struct Emitter<'a> {
    code: &'a mut [u8],
    pos: usize,
    cmp_flags_set: bool,
    rax_contains_copy: bool,
    put_char: u64,
    get_char: u64,
}

fn is_i8(value: i32) -> bool {
    value >= -128 && value <= 127
}

fn seq_upper_bound(nodes: &[Node]) -> usize {
    nodes
        .iter()
        .map(|node| match node {
            Node::Loop(body) => seq_upper_bound(body) + 9,
            Node::Output | Node::Input => 15,
            Node::Add(_) => 10,
            _ => 7,
        })
        .sum()
}

/// Worst-case image size for a program, prologue and epilogue included.
/// Useful for sizing the buffer handed to [`Emitter::create`].
pub fn code_upper_bound(program: &[Node]) -> usize {
    seq_upper_bound(program) + 11
}

impl<'a> Emitter<'a> {
    pub fn create(code: &'a mut [u8],put_char: u64,get_char: u64) -> Self {
        Self {
            code,
            pos: 0,
            cmp_flags_set: false,
            rax_contains_copy: false,
            put_char,
            get_char,
        }
    }

    fn push_u8(&mut self,value: u8) {
        self.code[self.pos] = value;
        self.pos += 1;
    }

    fn push_u32(&mut self,value: u32) {
        self.code[self.pos..self.pos + 4].copy_from_slice(&value.to_le_bytes());
        self.pos += 4;
    }

    fn push_u64(&mut self,value: u64) {
        self.code[self.pos..self.pos + 8].copy_from_slice(&value.to_le_bytes());
        self.pos += 8;
    }

    /// Emit the complete function around `program` and return the image
    /// length in bytes.  Fails up front if the buffer cannot hold the
    /// worst case, if an `Error` node survived parsing, or if a `Loop`
    /// reaches the plain-instruction path.
    pub fn emit_program(&mut self,program: &[Node]) -> Result<usize,Error> {
        if self.code.len() < code_upper_bound(program) {
            return Err(Error::CodeBufferFull);
        }
        // push rbp
        self.push_u8(0x55);
        // mov rbp, rsp
        self.push_u8(0x48);
        self.push_u8(0x89);
        self.push_u8(0xe5);
        // push rbx
        self.push_u8(0x53);
        // mov rbx, rdi
        self.push_u8(0x48);
        self.push_u8(0x89);
        self.push_u8(0xfb);

        self.emit_seq(program)?;

        // pop rbx
        self.push_u8(0x5b);
        // pop rbp
        self.push_u8(0x5d);
        // ret
        self.push_u8(0xc3);
        Ok(self.pos)
    }

    fn emit_seq(&mut self,nodes: &[Node]) -> Result<(),Error> {
        for node in nodes {
            if let Node::Loop(body) = node {
                self.emit_loop(body)?;
            } else {
                self.emit_node(node)?;
            }
        }
        Ok(())
    }

    fn emit_loop(&mut self,body: &[Node]) -> Result<(),Error> {
        let start = self.pos;
        self.emit_seq(body)?;
        if !self.cmp_flags_set {
            // cmp BYTE [rbx], 0
            self.push_u8(0x80);
            self.push_u8(0x3b);
            self.push_u8(0x00);
        }
        let rel = start as i64 - self.pos as i64;
        if rel >= -127 {
            // jne <rel8>
            self.push_u8(0x75);
            self.push_u8((rel - 2) as u8);
        } else {
            // jne <rel32>
            self.push_u8(0x0f);
            self.push_u8(0x85);
            self.push_u32((rel - 6) as u32);
        }
        Ok(())
    }

    fn emit_node(&mut self,node: &Node) -> Result<(),Error> {
        self.cmp_flags_set = false;
        match node {
            Node::Error => return Err(Error::SourceErrors),
            Node::Loop(_) => return Err(Error::StrayLoop),
            Node::Incr(n) => {
                // add BYTE [rbx], <n: imm8>
                self.push_u8(0x80);
                self.push_u8(0x03);
                self.push_u8(*n as u8);
                self.cmp_flags_set = true;
            }
            Node::Decr(n) => {
                // sub BYTE [rbx], <n: imm8>
                self.push_u8(0x80);
                self.push_u8(0x2b);
                self.push_u8(*n as u8);
                self.cmp_flags_set = true;
            }
            Node::Left(n) => {
                if is_i8(*n) {
                    // sub rbx, <n: imm8>
                    self.push_u8(0x48);
                    self.push_u8(0x83);
                    self.push_u8(0xeb);
                    self.push_u8(*n as u8);
                } else {
                    // sub rbx, <n: imm32>
                    self.push_u8(0x48);
                    self.push_u8(0x81);
                    self.push_u8(0xeb);
                    self.push_u32(*n as u32);
                }
            }
            Node::Right(n) => {
                if is_i8(*n) {
                    // add rbx, <n: imm8>
                    self.push_u8(0x48);
                    self.push_u8(0x83);
                    self.push_u8(0xc3);
                    self.push_u8(*n as u8);
                } else {
                    // add rbx, <n: imm32>
                    self.push_u8(0x48);
                    self.push_u8(0x81);
                    self.push_u8(0xc3);
                    self.push_u32(*n as u32);
                }
            }
            Node::Output => {
                // movzx edi, BYTE [rbx]
                self.push_u8(0x0f);
                self.push_u8(0xb6);
                self.push_u8(0x3b);
                // movabs rax, <put_char>
                self.push_u8(0x48);
                self.push_u8(0xb8);
                self.push_u64(self.put_char);
                // call rax
                self.push_u8(0xff);
                self.push_u8(0xd0);
            }
            Node::Input => {
                // movabs rax, <get_char>
                self.push_u8(0x48);
                self.push_u8(0xb8);
                self.push_u64(self.get_char);
                // call rax
                self.push_u8(0xff);
                self.push_u8(0xd0);
                // mov BYTE [rbx], al
                self.push_u8(0x88);
                self.push_u8(0x03);
            }
            Node::Zero => {
                // mov BYTE [rbx], 0
                self.push_u8(0xc6);
                self.push_u8(0x03);
                self.push_u8(0x00);
                self.cmp_flags_set = true;
            }
            Node::Add(offset) => {
                if !self.rax_contains_copy {
                    // movzx rax, BYTE [rbx]
                    self.push_u8(0x48);
                    self.push_u8(0x0f);
                    self.push_u8(0xb6);
                    self.push_u8(0x03);
                    self.rax_contains_copy = true;
                }
                if is_i8(*offset) {
                    // add BYTE [rbx + <offset: disp8>], al
                    self.push_u8(0x00);
                    self.push_u8(0x43);
                    self.push_u8(*offset as u8);
                } else {
                    // add BYTE [rbx + <offset: disp32>], al
                    self.push_u8(0x00);
                    self.push_u8(0x83);
                    self.push_u32(*offset as u32);
                }
            }
        }
        if !matches!(node,Node::Add(_)) {
            self.rax_contains_copy = false;
        }
        Ok(())
    }
}

#[cfg(test)]
fn emit(program: &[Node]) -> Vec<u8> {
    let mut code = vec![0u8;code_upper_bound(program)];
    let mut emitter = Emitter::create(&mut code,0,0);
    let len = emitter.emit_program(program).expect("emission failed");
    code.truncate(len);
    code
}

#[cfg(test)]
const PROLOGUE: &str = "554889e5534889fb";
#[cfg(test)]
const EPILOGUE: &str = "5b5dc3";

#[cfg(test)]
fn image(middle: &str) -> Vec<u8> {
    hex::decode([PROLOGUE,middle,EPILOGUE].concat()).unwrap()
}

#[test]
fn empty_program_is_prologue_epilogue() {
    assert_eq!(emit(&[]),hex::decode("554889e5534889fb5b5dc3").unwrap());
}

#[test]
fn cell_arithmetic() {
    assert_eq!(emit(&[Node::Incr(5)]),image("800305"));
    assert_eq!(emit(&[Node::Decr(255)]),image("802bff"));
    assert_eq!(emit(&[Node::Zero]),image("c60300"));
}

#[test]
fn pointer_moves_pick_short_and_long_forms() {
    assert_eq!(emit(&[Node::Right(1)]),image("4883c301"));
    assert_eq!(emit(&[Node::Left(127)]),image("4883eb7f"));
    // 128 no longer fits a signed byte
    assert_eq!(emit(&[Node::Right(128)]),image("4881c380000000"));
    assert_eq!(emit(&[Node::Left(300)]),image("4881eb2c010000"));
}

#[test]
fn io_calls_through_absolute_addresses() {
    let mut code = vec![0u8;64];
    let mut emitter = Emitter::create(&mut code,0x1122334455667788,0x99aabbccddeeff00);
    let len = emitter.emit_program(&[Node::Output,Node::Input]).unwrap();
    code.truncate(len);
    let expected = image(concat!(
        // movzx edi, BYTE [rbx]; movabs rax, put_char; call rax
        "0fb63b","48b8","8877665544332211","ffd0",
        // movabs rax, get_char; call rax; mov BYTE [rbx], al
        "48b8","00ffeeddccbbaa99","ffd0","8803",
    ));
    assert_eq!(code,expected);
}

#[test]
fn add_shares_one_load_across_a_pair() {
    // the copy-loop rewrite emits Add then Zero, back-to-back Adds come
    // from hand-built trees but the reload rule is the same
    let code = emit(&[Node::Add(3),Node::Add(-130),Node::Incr(1),Node::Add(1)]);
    let expected = image(concat!(
        "480fb603","004303",      // load once, add BYTE [rbx+3], al
        "00837effffff",           // second Add keeps rax, disp32 for -130
        "800301",                 // Incr invalidates the copy
        "480fb603","004301",      // so the next Add loads again
    ));
    assert_eq!(code,expected);
}

#[test]
fn loop_close_reuses_fresh_flags() {
    // Decr leaves ZF describing the cell, no cmp before the branch
    assert_eq!(emit(&[Node::Loop(vec![Node::Decr(1)])]),image("802b0175fb"));
    // a pointer move does not, the cmp comes back
    assert_eq!(
        emit(&[Node::Loop(vec![Node::Right(1)])]),
        image("4883c301803b0075f7")
    );
    // Zero counts as fresh flags too
    assert_eq!(emit(&[Node::Loop(vec![Node::Zero])]),image("c6030075fb"));
}

#[test]
fn nested_empty_loops() {
    // each level closes over its own cmp, innermost first
    let tree = vec![Node::Loop(vec![Node::Loop(vec![Node::Loop(vec![])])])];
    assert_eq!(
        emit(&tree),
        image("803b0075fb803b0075f6803b0075f1")
    );
}

#[test]
fn branch_width_tracks_body_size() {
    // 42 three-byte instructions put the displacement right at the rel8 edge
    let tree = vec![Node::Loop(vec![Node::Incr(1);42])];
    let code = emit(&tree);
    assert_eq!(code[code.len() - 5..code.len() - 3],hex::decode("7580").unwrap()[..]);
    // one more pushes it to rel32
    let tree = vec![Node::Loop(vec![Node::Incr(1);43])];
    let code = emit(&tree);
    assert_eq!(
        code[code.len() - 9..code.len() - 3],
        hex::decode("0f8579ffffff").unwrap()[..]
    );
}

#[test]
fn error_nodes_are_fatal() {
    let mut code = vec![0u8;64];
    let mut emitter = Emitter::create(&mut code,0,0);
    assert!(matches!(
        emitter.emit_program(&[Node::Incr(1),Node::Error]),
        Err(Error::SourceErrors)
    ));
}

#[test]
fn undersized_buffer_is_refused() {
    let mut code = vec![0u8;4];
    let mut emitter = Emitter::create(&mut code,0,0);
    assert!(matches!(
        emitter.emit_program(&[Node::Incr(1)]),
        Err(Error::CodeBufferFull)
    ));
}
