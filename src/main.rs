use getopts::Options;
use lolc::{
    cli::{run, Action},
    core::Config,
};
use std::{
    env,
    io::{self, Read},
    process::exit,
};

fn main() {
    let args: Vec<String> = env::args().collect();
    let bin = args[0].clone();

    let mut opts = Options::new();
    opts.optopt("o", "", "Output file name", "FILE");
    opts.optflag("S", "", "Print generated C");
    opts.optflag("p", "", "Print parse tree");
    opts.optflag("h", "help", "print this help menu");

    let matches = match opts.parse(&args[1..]) {
        Ok(m) => m,
        Err(f) => {
            eprintln!("{}", f);
            exit(1)
        }
    };

    let help = matches.opt_present("h");
    let parse = matches.opt_present("p");
    let genc = matches.opt_present("S");

    if help {
        print!("{}", opts.usage(&format!("Usage: {} [options]", bin)));
        return;
    }

    let output = matches
        .opt_str("o")
        .unwrap_or_else(|| String::from(if genc { "/dev/stdout" } else { "lol" }));

    let mut program = String::new();
    io::stdin().read_to_string(&mut program).expect("Expected a program in stdin");

    let config = Config { program, output };

    let action = if parse {
        Action::Parse
    } else if genc {
        Action::GenC
    } else {
        Action::Run
    };

    match run(&config, action) {
        Err(e) => {
            eprint!("{}", e);
            exit(1)
        }
        Ok(Some(out)) => println!("{}", out),
        Ok(None) => {}
    }
}
