use serde_json::Value;

use crate::error::{StoreError, StoreResult};
use crate::prelude::KVStore;

/// Lazily produced elements of a streamed result.
pub type Produced<'a> = Box<dyn Iterator<Item = StoreResult<Value>> + 'a>;

/// Mapping operations a request may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation
{
    Get,
    GetItem,
    Set,
    Delete,
    Contains,
    Len,
    Keys,
    Values,
    Items,
    Pop,
    SetDefault,
    Update,
    Clear,
}

impl Operation
{
    pub fn resolve(name: &str) -> Option<Operation>
    {
        let op = match name {
            "get" => Operation::Get,
            "__getitem__" => Operation::GetItem,
            "set" | "__setitem__" => Operation::Set,
            "delete" | "__delitem__" => Operation::Delete,
            "contains" | "__contains__" | "has_key" => Operation::Contains,
            "len" | "__len__" => Operation::Len,
            "keys" | "iterkeys" => Operation::Keys,
            "values" | "itervalues" => Operation::Values,
            "items" | "iteritems" => Operation::Items,
            "pop" => Operation::Pop,
            "setdefault" => Operation::SetDefault,
            "update" => Operation::Update,
            "clear" => Operation::Clear,
            _ => return None,
        };
        Some(op)
    }

    pub fn name(&self) -> &'static str
    {
        match self {
            Operation::Get => "get",
            Operation::GetItem => "__getitem__",
            Operation::Set => "set",
            Operation::Delete => "delete",
            Operation::Contains => "contains",
            Operation::Len => "len",
            Operation::Keys => "keys",
            Operation::Values => "values",
            Operation::Items => "items",
            Operation::Pop => "pop",
            Operation::SetDefault => "setdefault",
            Operation::Update => "update",
            Operation::Clear => "clear",
        }
    }

    /// Run the operation to completion and return its single result.
    /// Sequence operations are collected into an array.
    pub fn invoke(&self, store: &dyn KVStore, args: &[Value]) -> StoreResult<Value>
    {
        match self {
            Operation::Get => {
                self.arity(args, 1, 2)?;
                let key = self.key(args)?;
                let default = args.get(1).cloned().unwrap_or(Value::Null);
                Ok(store.get(key)?.unwrap_or(default))
            },
            Operation::GetItem => {
                self.arity(args, 1, 1)?;
                let key = self.key(args)?;
                store.get(key)?
                    .ok_or_else(|| StoreError::KeyNotFound(key.to_string()))
            },
            Operation::Set => {
                self.arity(args, 2, 2)?;
                store.put(self.key(args)?, &args[1])?;
                Ok(Value::Null)
            },
            Operation::Delete => {
                self.arity(args, 1, 1)?;
                let key = self.key(args)?;
                match store.delete(key)? {
                    true => Ok(Value::Null),
                    false => Err(StoreError::KeyNotFound(key.to_string())),
                }
            },
            Operation::Contains => {
                self.arity(args, 1, 1)?;
                Ok(Value::Bool(store.get(self.key(args)?)?.is_some()))
            },
            Operation::Len => {
                self.arity(args, 0, 0)?;
                Ok(Value::from(store.len()?))
            },
            Operation::Keys | Operation::Values | Operation::Items => {
                let items = self.produce(store, args)?;
                Ok(Value::Array(items.collect::<StoreResult<Vec<_>>>()?))
            },
            Operation::Pop => {
                self.arity(args, 1, 2)?;
                let key = self.key(args)?;
                match (store.get(key)?, args.get(1)) {
                    (Some(value), _) => {
                        store.delete(key)?;
                        Ok(value)
                    },
                    (None, Some(default)) => Ok(default.clone()),
                    (None, None) => Err(StoreError::KeyNotFound(key.to_string())),
                }
            },
            Operation::SetDefault => {
                self.arity(args, 1, 2)?;
                let key = self.key(args)?;
                if let Some(value) = store.get(key)? {
                    return Ok(value);
                }
                let default = args.get(1).cloned().unwrap_or(Value::Null);
                store.put(key, &default)?;
                Ok(default)
            },
            Operation::Update => {
                self.arity(args, 1, 1)?;
                for (key, value) in self.pairs(&args[0])? {
                    store.put(key, value)?;
                }
                Ok(Value::Null)
            },
            Operation::Clear => {
                self.arity(args, 0, 0)?;
                store.clear()?;
                Ok(Value::Null)
            },
        }
    }

    /// Start producing the operation's elements. Table sequences are pulled
    /// from the store one record at a time. Any other operation streams the
    /// elements of its result: an array's elements, an object's keys or a
    /// string's characters.
    pub fn produce<'a>(&self, store: &'a dyn KVStore, args: &[Value])
        -> StoreResult<Produced<'a>>
    {
        let records = match self {
            Operation::Keys | Operation::Values | Operation::Items => {
                self.arity(args, 0, 0)?;
                store.iter()?
            },
            _ => {
                let elements: Vec<Value> = match self.invoke(store, args)? {
                    Value::Array(elements) => elements,
                    Value::Object(map) => map.into_iter()
                        .map(|(key, _)| Value::String(key))
                        .collect(),
                    Value::String(text) => text.chars()
                        .map(|c| Value::String(c.to_string()))
                        .collect(),
                    _ => return Err(StoreError::NotIterable(self.name())),
                };
                return Ok(Box::new(elements.into_iter().map(Ok::<_, StoreError>)));
            },
        };

        let op = *self;
        Ok(Box::new(records.map(move |record| -> StoreResult<Value> {
            let (key, value) = record?;
            Ok(match op {
                Operation::Keys => Value::String(key),
                Operation::Values => value,
                _ => Value::Array(vec![Value::String(key), value]),
            })
        })))
    }

    fn arity(&self, args: &[Value], min: usize, max: usize) -> StoreResult<()>
    {
        if (min..=max).contains(&args.len()) {
            return Ok(());
        }
        let expected = if min == max {
            min.to_string()
        } else {
            std::format!("{} to {}", min, max)
        };
        Err(StoreError::Arguments { op: self.name(), expected, given: args.len() })
    }

    fn key<'v>(&self, args: &'v [Value]) -> StoreResult<&'v str>
    {
        match args.first() {
            Some(Value::String(key)) => Ok(key.as_str()),
            other => Err(StoreError::InvalidArgument(std::format!(
                        "{}() key must be a string, got {}", self.name(),
                        other.unwrap_or(&Value::Null)))),
        }
    }

    /// `update` accepts an object or an array of `[key, value]` pairs.
    fn pairs<'v>(&self, arg: &'v Value) -> StoreResult<Vec<(&'v str, &'v Value)>>
    {
        match arg {
            Value::Object(map) => {
                Ok(map.iter().map(|(k, v)| (k.as_str(), v)).collect())
            },
            Value::Array(pairs) => pairs.iter().map(|pair| match pair {
                Value::Array(kv) if kv.len() == 2 => match &kv[0] {
                    Value::String(key) => Ok((key.as_str(), &kv[1])),
                    other => Err(StoreError::InvalidArgument(std::format!(
                                "update() key must be a string, got {}", other))),
                },
                other => Err(StoreError::InvalidArgument(std::format!(
                            "update() expects [key, value] pairs, got {}", other))),
            }).collect(),
            other => Err(StoreError::InvalidArgument(std::format!(
                        "update() expects an object, got {}", other))),
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::memstore::MemBackend;
    use crate::prelude::StoreBackend;
    use serde_json::json;
    use std::path::Path;

    fn table() -> Box<dyn KVStore>
    {
        MemBackend::new().open(Path::new("ops.mem"), "t").unwrap()
    }

    #[test]
    fn resolves_aliases_and_rejects_unknown()
    {
        assert_eq!(Operation::resolve("__setitem__"), Some(Operation::Set));
        assert_eq!(Operation::resolve("has_key"), Some(Operation::Contains));
        assert_eq!(Operation::resolve("iteritems"), Some(Operation::Items));
        assert_eq!(Operation::resolve("Get"), None);
        assert_eq!(Operation::resolve("__class__"), None);
        assert_eq!(Operation::resolve(""), None);
    }

    #[test]
    fn get_falls_back_to_default()
    {
        let t = table();
        assert_eq!(Operation::Get.invoke(t.as_ref(), &[json!("x")]).unwrap(),
                   Value::Null);
        assert_eq!(Operation::Get.invoke(t.as_ref(), &[json!("x"), json!(7)])
                   .unwrap(), json!(7));
        let err = Operation::GetItem.invoke(t.as_ref(), &[json!("x")]).unwrap_err();
        assert_eq!(err.kind(), "KeyNotFound");
    }

    #[test]
    fn set_contains_delete()
    {
        let t = table();
        Operation::Set.invoke(t.as_ref(), &[json!("k"), json!([1, 2])]).unwrap();
        assert_eq!(Operation::Contains.invoke(t.as_ref(), &[json!("k")]).unwrap(),
                   json!(true));
        Operation::Delete.invoke(t.as_ref(), &[json!("k")]).unwrap();
        assert_eq!(Operation::Contains.invoke(t.as_ref(), &[json!("k")]).unwrap(),
                   json!(false));
        assert_eq!(Operation::Delete.invoke(t.as_ref(), &[json!("k")])
                   .unwrap_err().kind(), "KeyNotFound");
    }

    #[test]
    fn pop_and_setdefault()
    {
        let t = table();
        assert_eq!(Operation::SetDefault.invoke(t.as_ref(), &[json!("k"), json!(1)])
                   .unwrap(), json!(1));
        assert_eq!(Operation::SetDefault.invoke(t.as_ref(), &[json!("k"), json!(2)])
                   .unwrap(), json!(1));
        assert_eq!(Operation::Pop.invoke(t.as_ref(), &[json!("k")]).unwrap(),
                   json!(1));
        assert_eq!(Operation::Pop.invoke(t.as_ref(), &[json!("k"), json!("d")])
                   .unwrap(), json!("d"));
        assert_eq!(Operation::Pop.invoke(t.as_ref(), &[json!("k")])
                   .unwrap_err().kind(), "KeyNotFound");
    }

    #[test]
    fn update_accepts_objects_and_pairs()
    {
        let t = table();
        Operation::Update.invoke(t.as_ref(), &[json!({"a": 1, "b": 2})]).unwrap();
        Operation::Update.invoke(t.as_ref(), &[json!([["c", 3]])]).unwrap();
        assert_eq!(Operation::Len.invoke(t.as_ref(), &[]).unwrap(), json!(3));
        assert_eq!(Operation::Items.invoke(t.as_ref(), &[]).unwrap(),
                   json!([["a", 1], ["b", 2], ["c", 3]]));
        assert_eq!(Operation::Update.invoke(t.as_ref(), &[json!(5)])
                   .unwrap_err().kind(), "InvalidArgument");

        Operation::Clear.invoke(t.as_ref(), &[]).unwrap();
        assert_eq!(Operation::Keys.invoke(t.as_ref(), &[]).unwrap(), json!([]));
    }

    #[test]
    fn argument_checks()
    {
        let t = table();
        let err = Operation::Get.invoke(t.as_ref(), &[]).unwrap_err();
        assert_eq!(err.to_string(), "get() takes 1 to 2 argument(s) (0 given)");
        let err = Operation::Len.invoke(t.as_ref(), &[json!(1)]).unwrap_err();
        assert_eq!(err.kind(), "Arguments");
        let err = Operation::Get.invoke(t.as_ref(), &[json!(1)]).unwrap_err();
        assert_eq!(err.kind(), "InvalidArgument");
    }

    #[test]
    fn produce_streams_arrays_and_rejects_scalars()
    {
        let t = table();
        t.put("list", &json!(["x", "y"])).unwrap();
        let items: Vec<Value> = Operation::Get.produce(t.as_ref(), &[json!("list")])
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(items, vec![json!("x"), json!("y")]);

        let err = Operation::Len.produce(t.as_ref(), &[]).err().unwrap();
        assert_eq!(err.kind(), "NotIterable");
    }

    #[test]
    fn produce_streams_object_keys_and_string_chars()
    {
        let t = table();
        t.put("prefs", &json!({"color": true, "bell": false})).unwrap();
        t.put("handle", &json!("biff")).unwrap();

        let collect = |key: &str| -> Vec<Value> {
            Operation::Get.produce(t.as_ref(), &[json!(key)])
                .unwrap()
                .map(|r| r.unwrap())
                .collect()
        };
        assert_eq!(collect("prefs"), vec![json!("bell"), json!("color")]);
        assert_eq!(collect("handle"),
                   vec![json!("b"), json!("i"), json!("f"), json!("f")]);

        let err = Operation::Get.produce(t.as_ref(), &[json!("missing")])
            .err().unwrap();
        assert_eq!(err.kind(), "NotIterable");
    }
}
