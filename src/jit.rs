//! Executable memory and program invocation
//!
//! The whole runtime side of the compiler: map a read/write/execute
//! region, emit into it, hand the generated function a zeroed 30,000-byte
//! tape in `rdi` and call it.  The mapping and the tape are both released
//! when their owners drop, whichever way the caller unwinds.
//!
//! The generated code calls back into [`put_char`] and [`get_char`]
//! through absolute addresses baked into the image, so a `Jit` is only
//! meaningful inside the process that compiled it.

use std::io::{Read,Write};

use crate::emitter::{code_upper_bound,Emitter};
use crate::ir::Node;
use crate::Error;

/// Cells on the tape, index 0 is the initial pointer position.
pub const TAPE_LEN: usize = 30_000;

/// Floor for the mapping size, plenty for several thousand nodes.
const MIN_REGION_SIZE: usize = 32 * 1024;

/// Anonymous private mapping with read, write and execute permission.
/// Pages are zeroed by the kernel, so anything past the emitted image is
/// harmless garbage that never runs.
struct CodeRegion {
    base: *mut u8,
    size: usize,
}

impl CodeRegion {
    fn map(size: usize) -> Result<Self,Error> {
        let base = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if base == libc::MAP_FAILED {
            return Err(Error::MmapFailed);
        }
        Ok(Self {
            base: base as *mut u8,
            size,
        })
    }
    fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.base,self.size) }
    }
}

impl Drop for CodeRegion {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.base as *mut libc::c_void,self.size);
        }
    }
}

extern "C" fn put_char(value: u8) {
    // the C library buffers on its side, stdout flushes after the run
    let _ = std::io::stdout().write_all(&[value]);
}

extern "C" fn get_char() -> u8 {
    let mut buf = [0u8;1];
    match std::io::stdin().read_exact(&mut buf) {
        Ok(()) => buf[0],
        // end of stream reads as 0xff
        Err(_) => 0xff,
    }
}

/// A compiled program, ready to run any number of times.
pub struct Jit {
    region: CodeRegion,
    len: usize,
}

impl Jit {
    /// Emit `program` into a fresh executable mapping.
    pub fn compile(program: &[Node]) -> Result<Self,Error> {
        let size = page_round(code_upper_bound(program).max(MIN_REGION_SIZE));
        let mut region = CodeRegion::map(size)?;
        let mut emitter = Emitter::create(
            region.as_mut_slice(),
            put_char as usize as u64,
            get_char as usize as u64,
        );
        let len = emitter.emit_program(program)?;
        log::debug!("emitted {} bytes into a {} byte region",len,size);
        Ok(Self { region, len })
    }
    /// The emitted machine code.
    pub fn code(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.region.base,self.len) }
    }
    /// Run against a caller-owned tape, first argument per the System-V
    /// ABI.  The tape should hold [`TAPE_LEN`] cells, pointer moves past
    /// either end are unchecked.
    pub fn run_with_tape(&self,tape: &mut [u8]) {
        let runnable: extern "C" fn(*mut u8) =
            unsafe { std::mem::transmute(self.region.base) };
        runnable(tape.as_mut_ptr());
        let _ = std::io::stdout().flush();
    }
    /// Run against a fresh zeroed tape.
    pub fn run(&self) {
        let mut tape = vec![0u8;TAPE_LEN];
        self.run_with_tape(&mut tape);
    }
}

fn page_round(size: usize) -> usize {
    let page = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as usize;
    size.div_ceil(page) * page
}

#[cfg(test)]
use crate::{optimizer,parser};

#[test]
fn empty_program_leaves_the_tape_alone() {
    let jit = Jit::compile(&[]).unwrap();
    assert_eq!(jit.code(),hex::decode("554889e5534889fb5b5dc3").unwrap());
    let mut tape = vec![0u8;TAPE_LEN];
    jit.run_with_tape(&mut tape);
    assert!(tape.iter().all(|cell| *cell == 0));
}

#[test]
fn arithmetic_lands_on_the_tape() {
    let tree = optimizer::optimize(parser::parse_slice(b"+>+<-"));
    let jit = Jit::compile(&tree).unwrap();
    let mut tape = vec![0u8;TAPE_LEN];
    jit.run_with_tape(&mut tape);
    assert_eq!(tape[0],0);
    assert_eq!(tape[1],1);
}

#[test]
fn zeroing_loop_runs_to_zero() {
    // five up, then the optimizer turns [-] into a plain store
    let tree = optimizer::optimize(parser::parse_slice(b"+++++[-]"));
    assert_eq!(tree,vec![Node::Incr(5),Node::Zero]);
    let jit = Jit::compile(&tree).unwrap();
    let mut tape = vec![0u8;TAPE_LEN];
    jit.run_with_tape(&mut tape);
    assert_eq!(tape[0],0);
}

#[test]
fn copy_loop_moves_the_cell() {
    let tree = optimizer::optimize(parser::parse_slice(b"+++[>+<-]"));
    assert_eq!(tree,vec![Node::Incr(3),Node::Add(1),Node::Zero]);
    let jit = Jit::compile(&tree).unwrap();
    let mut tape = vec![0u8;TAPE_LEN];
    jit.run_with_tape(&mut tape);
    assert_eq!(tape[0],0);
    assert_eq!(tape[1],3);
}

#[test]
fn multiplication_program_fills_a_cell() {
    // 8 * 8 + 1 = 65 without ever printing
    let tree = optimizer::optimize(parser::parse_slice(b"++++++++[>++++++++<-]>+"));
    let jit = Jit::compile(&tree).unwrap();
    let mut tape = vec![0u8;TAPE_LEN];
    jit.run_with_tape(&mut tape);
    assert_eq!(tape[1],65);
}

#[test]
fn residual_errors_refuse_to_compile() {
    let tree = parser::parse_slice(b"[");
    assert!(matches!(Jit::compile(&tree),Err(Error::SourceErrors)));
}
