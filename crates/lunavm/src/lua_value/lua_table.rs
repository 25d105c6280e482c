use super::{LuaValue, TableRef};
use crate::lua_vm::{LuaError, LuaResult};
use ahash::AHashMap;

/// Hybrid array-plus-hash table.
///
/// The array part holds keys `1..=array.len()` contiguously and never
/// contains nil. Every other key lives in the hash part. Integer-valued
/// float keys are normalized to integers before any lookup or store,
/// so `t[2]` and `t[2.0]` name the same slot.
pub struct LuaTable {
    array: Vec<LuaValue>,
    hash: AHashMap<LuaValue, LuaValue>,
    metatable: Option<TableRef>,
}

impl LuaTable {
    pub fn new(array_hint: usize, hash_hint: usize) -> Self {
        Self {
            array: Vec::with_capacity(array_hint.min(1 << 16)),
            hash: AHashMap::with_capacity(hash_hint.min(1 << 16)),
            metatable: None,
        }
    }

    #[inline]
    fn normalize_key(key: &LuaValue) -> LuaValue {
        match key {
            LuaValue::Float(f)
                if f.fract() == 0.0
                    && f.is_finite()
                    && *f >= i64::MIN as f64
                    && *f <= i64::MAX as f64 =>
            {
                LuaValue::Integer(*f as i64)
            }
            other => other.clone(),
        }
    }

    /// Raw read; nil when the key is absent
    pub fn get(&self, key: &LuaValue) -> LuaValue {
        match Self::normalize_key(key) {
            LuaValue::Integer(i) => self.get_int(i),
            k => self.hash.get(&k).cloned().unwrap_or(LuaValue::Nil),
        }
    }

    pub fn get_int(&self, key: i64) -> LuaValue {
        if key >= 1 && (key as usize) <= self.array.len() {
            self.array[key as usize - 1].clone()
        } else {
            self.hash
                .get(&LuaValue::Integer(key))
                .cloned()
                .unwrap_or(LuaValue::Nil)
        }
    }

    /// Raw write, enforcing the key invariants: nil keys and NaN keys
    /// are rejected, assigning nil removes the entry.
    pub fn set(&mut self, key: LuaValue, value: LuaValue) -> LuaResult<()> {
        match Self::normalize_key(&key) {
            LuaValue::Nil => Err(LuaError::Runtime("table index is nil".to_string())),
            LuaValue::Float(f) if f.is_nan() => {
                Err(LuaError::Runtime("table index is NaN".to_string()))
            }
            LuaValue::Integer(i) => {
                self.set_int(i, value);
                Ok(())
            }
            k => {
                if value.is_nil() {
                    self.hash.remove(&k);
                } else {
                    self.hash.insert(k, value);
                }
                Ok(())
            }
        }
    }

    pub fn set_int(&mut self, key: i64, value: LuaValue) {
        let len = self.array.len() as i64;
        if key >= 1 && key <= len {
            if value.is_nil() {
                // Truncate at the hole; demote the tail to the hash part
                let idx = (key - 1) as usize;
                let tail: Vec<LuaValue> = self.array.drain(idx..).collect();
                for (offset, v) in tail.into_iter().enumerate().skip(1) {
                    self.hash.insert(LuaValue::Integer(key + offset as i64), v);
                }
            } else {
                self.array[(key - 1) as usize] = value;
            }
        } else if key == len + 1 && !value.is_nil() {
            // Extend the array part, then promote contiguous successors
            self.array.push(value);
            let mut next = key + 1;
            while let Some(v) = self.hash.remove(&LuaValue::Integer(next)) {
                self.array.push(v);
                next += 1;
            }
        } else if value.is_nil() {
            self.hash.remove(&LuaValue::Integer(key));
        } else {
            self.hash.insert(LuaValue::Integer(key), value);
        }
    }

    /// Infallible write for string keys (globals, registry, modules)
    pub fn set_field(&mut self, key: &str, value: LuaValue) {
        if value.is_nil() {
            self.hash.remove(&LuaValue::string(key));
        } else {
            self.hash.insert(LuaValue::string(key), value);
        }
    }

    /// A border: the array part is the contiguous non-nil prefix, so
    /// its length satisfies `t[n] ~= nil and t[n+1] == nil`.
    #[inline]
    pub fn len(&self) -> i64 {
        self.array.len() as i64
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.array.is_empty() && self.hash.is_empty()
    }

    /// Traversal step: array part in index order first, then the hash
    /// part in its (stable between mutations) iteration order. `Nil`
    /// starts the traversal; `None` ends it.
    pub fn next(&self, prev: &LuaValue) -> LuaResult<Option<(LuaValue, LuaValue)>> {
        match Self::normalize_key(prev) {
            LuaValue::Nil => {
                if let Some(first) = self.array.first() {
                    return Ok(Some((LuaValue::Integer(1), first.clone())));
                }
                Ok(self.first_hash_entry())
            }
            LuaValue::Integer(i) if i >= 1 && (i as usize) <= self.array.len() => {
                let next = i as usize; // zero-based index of the successor
                if next < self.array.len() {
                    Ok(Some((
                        LuaValue::Integer(i + 1),
                        self.array[next].clone(),
                    )))
                } else {
                    Ok(self.first_hash_entry())
                }
            }
            key => {
                let mut it = self.hash.iter();
                while let Some((k, _)) = it.next() {
                    if *k == key {
                        return Ok(it.next().map(|(k, v)| (k.clone(), v.clone())));
                    }
                }
                Err(LuaError::Runtime("invalid key to 'next'".to_string()))
            }
        }
    }

    fn first_hash_entry(&self) -> Option<(LuaValue, LuaValue)> {
        self.hash.iter().next().map(|(k, v)| (k.clone(), v.clone()))
    }

    #[inline]
    pub fn metatable(&self) -> Option<TableRef> {
        self.metatable.clone()
    }

    #[inline]
    pub fn set_metatable(&mut self, metatable: Option<TableRef>) {
        self.metatable = metatable;
    }
}
