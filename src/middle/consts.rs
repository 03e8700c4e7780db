//! The deduplicated constants pool.

use indexmap::IndexMap;

use crate::common::Value;
use crate::error::CompileError;
use crate::middle::mem::{Addr, MemoryManager, Segment};

/// Dedup key for a constant.  Floats key on their bit pattern, which gives
/// exact-value semantics: `3.50` and `3.5` collapse, `-3.2` and `3.2` don't.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
enum Key {
    Int(i64),
    Float(u64),
    Str(String),
}

impl Key {
    fn of(value: &Value) -> Self {
        match value {
            Value::Int(i) => Key::Int(*i),
            Value::Float(f) => Key::Float(f.to_bits()),
            Value::Str(s) => Key::Str(s.clone()),
        }
    }
}

/// `(value, type) → address`, allocating from the `const` segment on first
/// sight.  Iteration follows insertion order.
#[derive(Default, Debug)]
pub struct ConstantsTable {
    table: IndexMap<Key, (Value, Addr)>,
}

impl ConstantsTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Address of the constant, interning it if it is new.
    pub fn get_or_add(
        &mut self,
        value: Value,
        mem: &mut MemoryManager,
    ) -> Result<Addr, CompileError> {
        let key = Key::of(&value);
        if let Some((_, addr)) = self.table.get(&key) {
            return Ok(*addr);
        }
        let addr = mem.new_addr(Segment::Const, value.ty())?;
        self.table.insert(key, (value, addr));
        Ok(addr)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Addr, &Value)> {
        self.table.values().map(|(value, addr)| (*addr, value))
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl std::fmt::Display for ConstantsTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.table.is_empty() {
            return write!(f, "<empty>");
        }
        writeln!(f, " addr │ type   │ value")?;
        write!(f, "──────┼────────┼────────────────────")?;

        let mut rows: Vec<(Addr, &Value)> = self.iter().collect();
        rows.sort_by_key(|(addr, _)| *addr);
        for (addr, value) in rows {
            let rendered = match value {
                Value::Str(s) => format!("{s:?}"),
                other => other.to_string(),
            };
            write!(f, "\n{addr:>5} │ {:<6} │ {rendered}", value.ty().to_string())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_literals_share_an_address() {
        let mut mem = MemoryManager::new();
        let mut table = ConstantsTable::new();
        let first = table.get_or_add(Value::Int(5), &mut mem).unwrap();
        let second = table.get_or_add(Value::Int(5), &mut mem).unwrap();
        assert_eq!(first, second);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn distinct_values_get_distinct_addresses() {
        let mut mem = MemoryManager::new();
        let mut table = ConstantsTable::new();
        let five = table.get_or_add(Value::Int(5), &mut mem).unwrap();
        let six = table.get_or_add(Value::Int(6), &mut mem).unwrap();
        let five_f = table.get_or_add(Value::Float(5.0), &mut mem).unwrap();
        assert_ne!(five, six);
        assert_ne!(five, five_f);
        assert_eq!(five, 40000);
        assert_eq!(six, 40001);
        assert_eq!(five_f, 42000);
    }

    #[test]
    fn negated_literal_is_its_own_constant() {
        let mut mem = MemoryManager::new();
        let mut table = ConstantsTable::new();
        let pos = table.get_or_add(Value::Float(3.2), &mut mem).unwrap();
        let neg = table.get_or_add(Value::Float(-3.2), &mut mem).unwrap();
        assert_ne!(pos, neg);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn strings_are_interned_by_content() {
        let mut mem = MemoryManager::new();
        let mut table = ConstantsTable::new();
        let a = table.get_or_add(Value::Str("hola".into()), &mut mem).unwrap();
        let b = table.get_or_add(Value::Str("hola".into()), &mut mem).unwrap();
        let c = table.get_or_add(Value::Str("adios".into()), &mut mem).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, 44000);
    }
}
