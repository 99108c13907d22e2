//! Native bindings placed in the initial environment table before
//! execution begins.

use std::io::Write;

use nua_value::Value;

/// The printable form of a value: numbers print with six decimal
/// places, strings print their raw bytes, and the rest print a
/// type-tagged placeholder since nua has no user-defined `tostring`.
fn printable(v: &Value) -> String {
    match v {
        Value::Nil => "nil".to_string(),
        Value::Number(n) => format!("{n:.6}"),
        Value::Str(s) => s.as_str_lossy().into_owned(),
        Value::Table(t) => format!("table: {:p}", t.as_ptr()),
        Value::Function(f) => format!("function: {:p}", f.as_ptr()),
    }
}

/// `print`: write each argument's printable form followed by a
/// newline to standard output and flush. Returns no values.
pub fn print(args: &[Value]) -> Vec<Value> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for arg in args {
        let _ = writeln!(out, "{}", printable(arg));
    }
    let _ = out.flush();
    Vec::new()
}
