use bfjit::{ir,jit,lexer,optimizer,parser};
use clap::{arg,crate_version,Command};

fn main() -> Result<(),Box<dyn std::error::Error>>
{
    env_logger::init();

    let long_help =
"Examples:
---------
Run a file:          `bfjit hello.bf`
Run from stdin:      `echo '+++.' | bfjit`
Inspect the tree:    `bfjit --dump-ir hello.bf`
Inspect the code:    `bfjit --dump-code hello.bf`";

    let main_cmd = Command::new("bfjit")
        .about("JIT compile and run brainfuck programs")
        .after_long_help(long_help)
        .version(crate_version!())
        .arg(arg!([path] "source file, read standard input when omitted"))
        .arg(arg!(--"dump-ir" "print the tree before running"))
        .arg(arg!(--"dump-code" "hex dump the generated machine code"))
        .arg(arg!(--"no-opt" "compile the parsed tree as-is"));

    let matches = main_cmd.get_matches();

    let ast = match matches.get_one::<String>("path") {
        Some(path) => {
            let text = std::fs::read(path)?;
            parser::parse_slice(&text)
        }
        None => {
            let stdin = std::io::stdin();
            parser::Parser::create(lexer::Lexer::from_reader(stdin.lock())).parse()
        }
    };

    let ast = match matches.get_flag("no-opt") {
        true => ast,
        false => optimizer::optimize(ast),
    };

    if matches.get_flag("dump-ir") {
        println!("{}",ir::render(&ast));
    }

    let jit = jit::Jit::compile(&ast)?;

    if matches.get_flag("dump-code") {
        for chunk in jit.code().chunks(16) {
            println!("{}",hex::encode(chunk));
        }
    }

    jit.run();
    Ok(())
}
