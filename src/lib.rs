/*!

# The LOL compiler

A tiny lisp to C compiler. A program is one expression built from lambdas,
`if`, `let`, 64 bit integers, strings and ten built-in procedures; the
compiler reads it on stdin and emits a self contained C translation unit
that runs against the stack machine runtime in [rt](crate::rt).

## Where do I get started? 🕵️‍♀️

The pipeline is strictly linear and each module is one stage, so the source
reads best in data-flow order:

1. [tokenizer](crate::tokenizer) — bytes to offset-tagged tokens, one small
   state machine.
2. [parser](crate::parser) — tokens to an arena of 32 bit node ids.
3. [rpn](crate::rpn) — the AST flattened into reverse-Polish stack machine
   instructions.
4. [resolve](crate::resolve) — capture analysis and hop resolution; after
   this, variable references are integers instead of names.
5. [compiler](crate::compiler) — one C function per lambda plus a `main`.
6. [rt](crate::rt) — the co-designed runtime the generated code calls into,
   exported with a C ABI so the output of gcc can link `liblolc.a`.

## Usage

```bash
$ echo '(lambda (x) (+ x 1))' | cargo run -q -- -S   # print the C unit
$ echo '(lambda (x) (+ x 1))' | cargo run -q         # compile and run
```

The generated unit includes `support.h` from the `runtime/` folder and
links against the staticlib cargo builds into `target/debug`:

```bash
$ gcc -I runtime lol.c -L target/debug -llolc -lpthread -ldl -lm -o lol
$ ./lol; echo $?
2
```

The exit status of the compiled program is the number the outermost lambda
leaves in the accumulator, and its single argument is argc. `prog-arg`
reads the actual argument strings.

## Misc

The runtime is deliberately a process-global machine; the emitted C names
`top`, `stack`, `binds` and `context_stack` directly. Closure cells and
runtime strings leak. Both are inherited from the C runtime this one is
compatible with, and both only matter for programs that run a lot longer
than the ones LOL can express.

*/

pub mod cli;
pub mod compiler;
pub mod core;
pub mod parser;
pub mod resolve;
pub mod rpn;
#[allow(non_snake_case, non_upper_case_globals)]
pub mod rt;
pub mod tokenizer;
