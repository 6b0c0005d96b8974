//! Разрешение составных имён в объекты.
//!
//! `pkg.mod.NAME` разбивается на самый длинный импортируемый префикс
//! (модуль) и хвост — путь атрибутов, который проходится по одному сегменту.

use std::path::Path;

use log::trace;

use super::{finder, ModuleLoader};
use crate::error::{ImportError, ImportResult};
use crate::value::Value;

/// Что разрешать: строку-идентификатор или уже готовое значение.
///
/// Готовые значения возвращаются как есть, поэтому поле конфигурации может
/// хранить и имя, и сам объект.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectRef {
    Path(String),
    Live(Value),
}

impl From<&str> for ObjectRef {
    fn from(path: &str) -> Self {
        ObjectRef::Path(path.to_string())
    }
}

impl From<String> for ObjectRef {
    fn from(path: String) -> Self {
        ObjectRef::Path(path)
    }
}

impl From<Value> for ObjectRef {
    fn from(value: Value) -> Self {
        match value {
            Value::String(path) => ObjectRef::Path(path),
            other => ObjectRef::Live(other),
        }
    }
}

impl ModuleLoader {
    /// Разрешить идентификатор вида `pkg.mod.NAME` в значение.
    ///
    /// Сначала импортируется всё имя; если такого модуля нет, последний
    /// сегмент переносится в путь атрибутов и попытка повторяется, пока не
    /// останется имя без точек.
    ///
    /// Ошибки:
    /// - [`ImportError::ModuleNotFound`] — не импортируется ни один префикс;
    /// - [`ImportError::AttributeNotFound`] — модуль есть, атрибута нет.
    ///
    /// Прочие ошибки импорта (исполнение, разбор, циклы) не перехватываются.
    pub fn load_object(&mut self, target: impl Into<ObjectRef>) -> ImportResult<Value> {
        let path = match target.into() {
            ObjectRef::Live(value) => return Ok(value),
            ObjectRef::Path(path) => path,
        };

        let (mut module_name, mut attributes) = split_module_candidate(&path);
        let module = loop {
            match self.import_module(module_name) {
                Ok(module) => break module,
                Err(ImportError::ModuleNotFound(missing))
                    if names_prefix(&missing, module_name) =>
                {
                    let Some((parent, last)) = module_name.rsplit_once('.') else {
                        return Err(ImportError::ModuleNotFound(missing));
                    };
                    trace!("'{}' is not a module, trying '{}'", module_name, parent);
                    attributes.push(last);
                    module_name = parent;
                }
                Err(err) => return Err(err),
            }
        };

        let mut value = Value::Module(module);
        let mut resolved = module_name.to_string();
        for attribute in attributes.into_iter().rev() {
            value = value
                .attr(attribute)
                .ok_or_else(|| ImportError::AttributeNotFound {
                    object: resolved.clone(),
                    attribute: attribute.to_string(),
                })?;
            resolved.push('.');
            resolved.push_str(attribute);
        }
        Ok(value)
    }

    /// Загрузить модуль по пути, если такой путь существует, иначе
    /// разрешить строку как составное имя.
    pub fn load_module_or_object(&mut self, target: &str) -> ImportResult<Value> {
        if Path::new(target).exists() {
            self.load_from_path(target).map(Value::Module)
        } else {
            self.load_object(target)
        }
    }
}

/// Самый длинный префикс, который вообще может быть именем модуля, и
/// остаток как путь атрибутов (в порядке стека: последний сегмент первым).
///
/// Сегменты после первого недопустимого не могут быть модулями, но могут
/// быть атрибутами. Если недопустим первый сегмент или есть пустые
/// сегменты, имя целиком уходит в импорт и получает `InvalidName`.
fn split_module_candidate(path: &str) -> (&str, Vec<&str>) {
    let segments: Vec<&str> = path.split('.').collect();
    let valid = segments
        .iter()
        .take_while(|segment| finder::is_identifier(segment))
        .count();
    let tail = &segments[valid..];
    if valid == 0 || tail.is_empty() || tail.iter().any(|segment| segment.is_empty()) {
        return (path, Vec::new());
    }
    let prefix_len = segments[..valid].iter().map(|s| s.len()).sum::<usize>() + valid - 1;
    (&path[..prefix_len], tail.iter().rev().copied().collect())
}

/// `missing` — это `attempted` или один из его родительских пакетов.
///
/// Так отличаем «такого модуля нет» от отсутствующего импорта внутри
/// тела найденного модуля.
fn names_prefix(missing: &str, attempted: &str) -> bool {
    attempted == missing
        || attempted
            .strip_prefix(missing)
            .is_some_and(|rest| rest.starts_with('.'))
}
