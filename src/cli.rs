//! Command line interface for lolc

use crate::{
    compiler,
    core::{Ast, Config, Error, Source},
    parser, resolve, rpn, tokenizer,
};

use std::{fs::File, io::Write, path::PathBuf, process::Command};

#[derive(Copy, Clone)]
pub enum Action {
    Parse,
    GenC,
    Build,
    Run,
}

/// Compile a program to a C translation unit.
///
/// The stages run strictly in order and each one finishes before the next
/// starts: tokenize, parse, lower, resolve, emit. Dumps of the token
/// stream, the parse tree and the resolved RPN go to stderr along the way.
pub fn compile(program: &str) -> Result<String, Error> {
    let mut source = Source::default();
    source.feed(program);

    let tokens = tokenizer::tokenize(&source)?;
    for token in &tokens {
        eprintln!("{}", tokenizer::describe(&source, token));
    }

    let mut ast = Ast::default();
    let root = parser::parse(&tokens, &mut ast)?;
    eprintln!("{}", ast.pretty(&source, root));

    let mut rpn = rpn::lower(&source, &ast, root)?;
    resolve::resolve(&source, &mut rpn);
    eprint!("{}", rpn::dump(&source, &rpn));

    compiler::program(&source, &rpn)
}

pub fn run(config: &Config, action: Action) -> Result<Option<String>, Error> {
    match action {
        Action::Parse => {
            let mut source = Source::default();
            source.feed(&config.program);
            let tokens = tokenizer::tokenize(&source)?;
            let mut ast = Ast::default();
            let root = parser::parse(&tokens, &mut ast)?;
            Ok(Some(ast.pretty(&source, root)))
        }
        Action::GenC => {
            gen(config)?;
            Ok(None)
        }
        Action::Build => {
            gen(config)?;
            build(config)?;
            Ok(None)
        }
        Action::Run => {
            gen(config)?;
            build(config)?;
            let (_status, stdout) = exec(config, &[])?;
            Ok(Some(stdout))
        }
    }
}

pub fn gen(config: &Config) -> Result<(), Error> {
    let unit = compile(&config.program)?;

    let mut handler = File::create(config.c_file()).map_err(|e| Error::Internal {
        message: format!("Failed to create {}", config.c_file()),
        e: Some(e),
    })?;

    handler.write_all(unit.as_bytes()).map_err(|e| Error::Internal {
        message: format!("Failed to write to {}", config.c_file()),
        e: Some(e),
    })?;

    Ok(())
}

/// Build the generated C unit with the host gcc against the runtime header
/// and the staticlib cargo leaves in target/debug.
pub fn build(config: &Config) -> Result<(), Error> {
    let exe = Command::new("gcc")
        .arg("-O0")
        .arg("-g")
        .arg("-I")
        .arg("runtime")
        .arg(config.c_file())
        .arg("-L./target/debug")
        .arg("-llolc")
        .arg("-lpthread")
        .arg("-ldl")
        .arg("-lm")
        .arg("-o")
        .arg(&config.output)
        .output()
        .map_err(|e| Error::Internal {
            message: String::from("Failed to execute the C compiler"),
            e: Some(e),
        })?;

    if exe.status.success() {
        Ok(())
    } else {
        Err(Error::Internal {
            message: format!(
                "Failed to compile the generated C unit. \n{}",
                String::from_utf8_lossy(&exe.stderr)
            ),
            e: None,
        })
    }
}

/// Run the compiled binary with the given arguments; return its exit status
/// and stdout. The status is what the outermost lambda left in the
/// accumulator, masked to a byte by the OS.
pub fn exec(config: &Config, args: &[&str]) -> Result<(i32, String), Error> {
    let path = PathBuf::from(&config.output).canonicalize()?;
    let exe = Command::new(&path).args(args).output()?;

    let status = exe.status.code().unwrap_or(-1);
    Ok((status, String::from_utf8_lossy(&exe.stdout).to_string()))
}
