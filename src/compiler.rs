//! Emit a C translation unit for the resolved RPN
//!
//! Every lambda becomes one C function `genLambdaK` plus a static descriptor
//! `lambda_type_K` right after its closing brace. Bodies are emitted
//! innermost first, so by the time an outer body pushes `&lambda_type_K` the
//! descriptor is already defined and no forward declarations are needed. A
//! `main` at the end hands argc to the outermost lambda and returns whatever
//! number it leaves in the accumulator.
//!
//! The emitted code is straight-line calls into the runtime ABI declared in
//! `runtime/support.h`; conditionals map to structured C `if`/`else` rather
//! than jumps, which the bracket shape of the RPN guarantees is enough.

use crate::core::{Error, Source};
use crate::rpn::{Ins, Rpn};

/// Runtime descriptor for a built-in, by surface name.
pub fn builtin(name: &str) -> Option<&'static str> {
    match name {
        "+" => Some("sup_builtin_add"),
        "-" => Some("sup_builtin_subtract"),
        "=" => Some("sup_builtin_equals"),
        "<" => Some("sup_builtin_less_than"),
        "or" => Some("sup_builtin_bitwise_or"),
        "and" => Some("sup_builtin_bitwise_and"),
        "prog-arg" => Some("sup_builtin_program_argument"),
        "str-to-num" => Some("sup_builtin_string_to_number"),
        "num-to-str" => Some("sup_builtin_number_to_string"),
        "put-str" => Some("sup_builtin_put_string"),
        _ => None,
    }
}

struct Emit {
    out: String,
    indent: usize,
}

impl Emit {
    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }
}

fn lambda_no(rpn: &Rpn, at: usize) -> Result<usize, Error> {
    rpn.lambdas
        .iter()
        .position(|&i| i as usize == at)
        .ok_or_else(|| Error::Codegen(format!("no lambda opens at instruction {}", at)))
}

/// Emit `genLambdaK` and its descriptor.
///
/// The walk starts at the lambda's own instruction and keeps a nesting
/// depth; only depth 1 belongs to this function. A nested lambda
/// contributes a single descriptor push and its whole body is skipped,
/// since it gets its own pass.
fn function(source: &Source, rpn: &Rpn, k: usize) -> Result<String, Error> {
    let start = rpn.lambdas[k] as usize;
    let mut e = Emit { out: String::new(), indent: 1 };
    let mut depth = 0u32;

    e.out.push_str(&format!("void genLambda{}(void) {{\n", k));

    for at in start..rpn.ins.len() {
        let ins = rpn.ins[at];
        match ins {
            Ins::Lambda { .. } => {
                depth += 1;
                // Only a lambda directly below this body is pushed here; a
                // deeper one belongs to the intermediate lambda's own pass.
                if depth == 2 {
                    let inner = lambda_no(rpn, at)?;
                    e.line(&format!("supPushLambda(&lambda_type_{});", inner));
                }
            }
            Ins::LambdaRet => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            _ if depth > 1 => {}
            Ins::LambdaContextLoad => {
                e.line("context_stack = top.v.context;");
                e.line("supStackDrop();");
            }
            Ins::ScopeBegin { id } => {
                e.line(&format!(
                    "struct HeapVariable *saved_context_{} = context_stack;",
                    id
                ));
                e.line(&format!("BindsIndex saved_binds_{} = binds_index;", id));
            }
            Ins::ScopeEnd { id } => {
                e.line(&format!("context_stack = saved_context_{};", id));
                e.line(&format!("binds_index = saved_binds_{};", id));
            }
            Ins::ConditionStart { .. } => {
                e.line("if (top.v.number) {");
                e.indent += 1;
                e.line("supStackDrop();");
            }
            Ins::ConditionElse { .. } => {
                e.indent -= 1;
                e.line("} else {");
                e.indent += 1;
                e.line("supStackDrop();");
            }
            Ins::ConditionEnd => {
                e.indent -= 1;
                e.line("}");
            }
            Ins::Bind { .. } => e.line("supBind();"),
            Ins::BindCaptured { .. } => e.line("supBindCaptured();"),
            Ins::GetByHops { hops } => e.line(&format!("supGet({});", hops)),
            Ins::SetByHops { hops } => e.line(&format!("supSet({});", hops)),
            Ins::GetCapturedByHops { hops } => e.line(&format!("supGetCaptured({});", hops)),
            Ins::SetCapturedByHops { hops } => e.line(&format!("supSetCaptured({});", hops)),
            Ins::PushNumber { value } => {
                if value == i64::MIN {
                    // the magnitude does not fit a C literal
                    e.line("supPushNumber(-9223372036854775807LL - 1);");
                } else {
                    e.line(&format!("supPushNumber({}LL);", value));
                }
            }
            Ins::Call { .. } => e.line("supCall();"),
            Ins::Str { offset } => {
                // escape pairs pass through to the C literal as written
                e.line(&format!("supPushString(\"{}\");", source.string_at(offset)));
            }
            Ins::Get { name } => match builtin(source.symbol_at(name)) {
                Some(descriptor) => e.line(&format!("supPushLambda(&{});", descriptor)),
                None => {
                    return Err(Error::UnknownPrimitive(source.symbol_at(name).to_string()))
                }
            },
            Ins::Set { .. }
            | Ins::GetCaptured { .. }
            | Ins::SetCaptured { .. }
            | Ins::Placeholder => {
                return Err(Error::Codegen(format!(
                    "cannot generate code for {:?} in genLambda{}",
                    ins, k
                )));
            }
        }
    }

    e.out.push_str("}\n");
    e.out.push_str(&format!(
        "static struct ManagedType lambda_type_{} = {{ \"lambda\", genLambda{} }};\n",
        k, k
    ));
    Ok(e.out)
}

fn driver() -> &'static str {
    r#"int main(int argc, char **argv) {
    program_args = argv;
    program_args_count = argc;
    supPushNumber(argc);
    supPushLambda(&lambda_type_0);
    supCall();
    return (int)top.v.number;
}
"#
}

/// Emit the whole translation unit.
pub fn program(source: &Source, rpn: &Rpn) -> Result<String, Error> {
    if rpn.lambdas.first() != Some(&0) {
        return Err(Error::Codegen(String::from(
            "the top level expression must be a lambda",
        )));
    }

    let mut out = String::from("#include \"support.h\"\n\n");
    for k in (0..rpn.lambdas.len()).rev() {
        out.push_str(&function(source, rpn, k)?);
        out.push('\n');
    }
    out.push_str(driver());
    Ok(out)
}
