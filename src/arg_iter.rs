//! Приведение аргумента к последовательности значений.
//!
//! Настройки, которые принимают «одно значение или несколько», проходят
//! через [`arg_to_iter`]: отсутствие значения превращается в пустую
//! последовательность, массив или поток отдаются поэлементно, всё прочее —
//! одним элементом.

use std::fmt;

use crate::value::Value;

/// Аргумент, который надо привести к последовательности.
pub enum Arg {
    /// Значение отсутствует
    None,
    Value(Value),
    /// Ленивый поток значений; читается только по мере обхода
    Stream(Box<dyn Iterator<Item = Value>>),
}

impl Arg {
    pub fn stream(iter: impl Iterator<Item = Value> + 'static) -> Self {
        Arg::Stream(Box::new(iter))
    }
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::None => write!(f, "None"),
            Arg::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Arg::Stream(_) => write!(f, "Stream(..)"),
        }
    }
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        Arg::Value(value)
    }
}

impl From<Option<Value>> for Arg {
    fn from(value: Option<Value>) -> Self {
        value.map_or(Arg::None, Arg::Value)
    }
}

impl From<Vec<Value>> for Arg {
    fn from(items: Vec<Value>) -> Self {
        Arg::Value(Value::Array(items))
    }
}

impl From<Box<dyn Iterator<Item = Value>>> for Arg {
    fn from(iter: Box<dyn Iterator<Item = Value>>) -> Self {
        Arg::Stream(iter)
    }
}

/// Значения, которые по умолчанию не разворачиваются: строки, словари
/// и записи. Скаляры, функции и модули неделимы при любом предикате.
pub fn is_atomic_by_default(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Dict(_) | Value::Record(_))
}

/// Приводит аргументы к последовательностям.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    atomic: fn(&Value) -> bool,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Normalizer {
    pub fn new() -> Self {
        Self {
            atomic: is_atomic_by_default,
        }
    }

    /// Заменить правило неделимости.
    pub fn with_atomic(atomic: fn(&Value) -> bool) -> Self {
        Self { atomic }
    }

    pub fn normalize(&self, arg: impl Into<Arg>) -> ArgIter {
        let inner = match arg.into() {
            Arg::None => Inner::Empty,
            Arg::Stream(iter) => Inner::Stream(iter),
            Arg::Value(value) if (self.atomic)(&value) => Inner::Once(Some(value)),
            Arg::Value(value) => match elements(value) {
                Ok(items) => Inner::Items(items.into_iter()),
                Err(value) => Inner::Once(Some(value)),
            },
        };
        ArgIter { inner }
    }
}

/// Элементы составного значения; неделимое значение возвращается как есть.
fn elements(value: Value) -> Result<Vec<Value>, Value> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Dict(map) => Ok(map.into_keys().map(Value::String).collect()),
        Value::Record(record) => Ok(record.fields.into_values().collect()),
        Value::String(text) => Ok(text.chars().map(|c| Value::String(c.to_string())).collect()),
        other => Err(other),
    }
}

/// Привести аргумент к последовательности с правилом по умолчанию.
///
/// ```rust,ignore
/// assert_eq!(arg_to_iter(None::<Value>).count(), 0);
/// assert_eq!(arg_to_iter(Value::from("lala")).collect::<Vec<_>>(), vec![Value::from("lala")]);
/// ```
pub fn arg_to_iter(arg: impl Into<Arg>) -> ArgIter {
    Normalizer::new().normalize(arg)
}

/// Результат [`arg_to_iter`].
pub struct ArgIter {
    inner: Inner,
}

enum Inner {
    Empty,
    Once(Option<Value>),
    Items(std::vec::IntoIter<Value>),
    Stream(Box<dyn Iterator<Item = Value>>),
}

impl Iterator for ArgIter {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        match &mut self.inner {
            Inner::Empty => None,
            Inner::Once(value) => value.take(),
            Inner::Items(items) => items.next(),
            Inner::Stream(iter) => iter.next(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match &self.inner {
            Inner::Empty => (0, Some(0)),
            Inner::Once(value) => {
                let n = usize::from(value.is_some());
                (n, Some(n))
            }
            Inner::Items(items) => items.size_hint(),
            Inner::Stream(iter) => iter.size_hint(),
        }
    }
}

impl fmt::Debug for ArgIter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArgIter").finish_non_exhaustive()
    }
}
