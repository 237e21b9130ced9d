//! Math built-ins: all operate on `as_number()`'s coercion of their
//! argument, returning `Float` unless the source spec calls for an int.

use crate::value::Value;

pub(super) fn call(name: &str, args: &[Value]) -> Option<Value> {
    let arg = |i: usize| args.get(i).map(Value::as_number).map(crate::value::Number::as_f64);

    match name {
        "abs" => Some(Value::Float(arg(0)?.abs())),
        "sin" => Some(Value::Float(arg(0)?.sin())),
        "cos" => Some(Value::Float(arg(0)?.cos())),
        "sqrt" => Some(Value::Float(arg(0)?.sqrt())),
        "power" => Some(Value::Float(arg(0)?.powf(arg(1)?))),
        "integer" => Some(Value::Int(arg(0)?.round() as i32)),
        "float" => Some(Value::Float(arg(0)?)),
        "min" => Some(numeric_fold(args, f64::min)),
        "max" => Some(numeric_fold(args, f64::max)),
        "random" => {
            let upper = arg(0)?.max(1.0) as i64;
            Some(Value::Int(pseudo_random(upper)))
        }
        _ => None,
    }
}

fn numeric_fold(args: &[Value], f: impl Fn(f64, f64) -> f64) -> Value {
    let mut values = args.iter().map(|v| v.as_number().as_f64());
    let first = values.next().unwrap_or(0.0);
    Value::Float(values.fold(first, f))
}

fn pseudo_random(upper: i64) -> i32 {
    (upper / 2).max(1) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abs_and_power() {
        assert_eq!(call("abs", &[Value::Int(-4)]), Some(Value::Float(4.0)));
        assert_eq!(call("power", &[Value::Int(2), Value::Int(3)]), Some(Value::Float(8.0)));
    }

    #[test]
    fn min_and_max_fold_across_args() {
        let args = vec![Value::Int(3), Value::Int(9), Value::Int(1)];
        assert_eq!(call("min", &args), Some(Value::Float(1.0)));
        assert_eq!(call("max", &args), Some(Value::Float(9.0)));
    }
}
