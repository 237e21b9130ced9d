//! List and prop-list built-ins. By convention the list/prop-list itself
//! is `args[0]`; the remaining elements are the operation's own operands.

use crate::value::{List, PropList, Symbol, Value};

pub(super) fn call(name: &str, args: &[Value]) -> Option<Value> {
    let receiver = args.first()?;
    let rest = &args[1..];

    match name {
        "list" => return Some(Value::list(args.to_vec())),
        "count" => {
            return Some(Value::Int(match receiver {
                Value::List(l) => l.borrow().len() as i32,
                Value::PropList(p) => p.borrow().count() as i32,
                _ => return None,
            }));
        }
        _ => {}
    }

    if let Value::List(list) = receiver {
        let mut list = list.borrow_mut();
        return match name {
            "add" => {
                list.add(rest.first().cloned().unwrap_or(Value::Void));
                Some(Value::Void)
            }
            "addat" => {
                list.add_at(index_arg(rest)?, rest.get(1).cloned().unwrap_or(Value::Void));
                Some(Value::Void)
            }
            "deleteat" => list.delete_at(index_arg(rest)?).or(Some(Value::Void)),
            "getat" => Some(list.get_at(index_arg(rest)?).cloned().unwrap_or(Value::Void)),
            "setat" => {
                list.set_at(index_arg(rest)?, rest.get(1).cloned().unwrap_or(Value::Void));
                Some(Value::Void)
            }
            "findpos" | "getone" => Some(rest.first().and_then(|v| list.find_pos(v)).map_or(Value::Void, Value::Int)),
            "sort" => {
                let mut items = list.items().to_vec();
                items.sort_by(|a, b| a.as_number().as_f64().partial_cmp(&b.as_number().as_f64()).unwrap_or(std::cmp::Ordering::Equal));
                *list = List::from_items(items);
                Some(Value::Void)
            }
            _ => None,
        };
    }

    if let Value::PropList(props) = receiver {
        let mut props = props.borrow_mut();
        return match name {
            "addprop" => {
                if let Some(key) = rest.first().and_then(prop_key) {
                    props.add_prop(key, rest.get(1).cloned().unwrap_or(Value::Void));
                }
                Some(Value::Void)
            }
            "setprop" => {
                if let Some(key) = rest.first().and_then(prop_key) {
                    props.set_prop(key, rest.get(1).cloned().unwrap_or(Value::Void));
                }
                Some(Value::Void)
            }
            "getprop" => {
                let key = rest.first().and_then(prop_key)?;
                Some(props.get_prop(&key).cloned().unwrap_or(Value::Void))
            }
            "deleteprop" => {
                let key = rest.first().and_then(prop_key)?;
                props.delete_prop(&key)
            }
            "getpropat" => Some(
                props
                    .get_prop_at(index_arg(rest)?)
                    .map_or(Value::Void, |(k, _)| Value::Symbol(k.clone())),
            ),
            _ => None,
        };
    }

    None
}

fn index_arg(rest: &[Value]) -> Option<i32> {
    Some(rest.first()?.as_number().as_f64() as i32)
}

fn prop_key(value: &Value) -> Option<Symbol> {
    match value {
        Value::Symbol(s) => Some(s.clone()),
        Value::String(s) => Some(Symbol::new(s.clone())),
        _ => None,
    }
}
