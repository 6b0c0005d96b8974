//! Реестр модулей.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use log::warn;
use parking_lot::RwLock;

use super::finder::{Finder, ModuleSpec, Origin};
use crate::value::Value;

/// Разделяемая ссылка на загруженный модуль.
pub type ModuleRef = Arc<Module>;

/// Загруженный модуль.
pub struct Module {
    /// Каноническое имя (ключ в реестре)
    name: String,
    /// Откуда прочитан исходник (`None` для синтетических модулей)
    origin: Option<Origin>,
    /// Где искать подмодули; есть только у пакетов
    search_locations: Option<Vec<Arc<dyn Finder>>>,
    /// Пространство имён
    attrs: RwLock<BTreeMap<String, Value>>,
}

impl Module {
    /// Создать пустой модуль без источника.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            origin: None,
            search_locations: None,
            attrs: RwLock::new(BTreeMap::new()),
        }
    }

    /// Создать модуль из найденного исходника (пространство имён пустое).
    pub fn from_spec(name: impl Into<String>, spec: &ModuleSpec) -> Self {
        Self {
            name: name.into(),
            origin: Some(spec.origin.clone()),
            search_locations: spec.submodule_location.clone().map(|location| vec![location]),
            attrs: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn origin(&self) -> Option<&Origin> {
        self.origin.as_ref()
    }

    pub fn is_package(&self) -> bool {
        self.search_locations.is_some()
    }

    pub fn search_locations(&self) -> &[Arc<dyn Finder>] {
        self.search_locations.as_deref().unwrap_or(&[])
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.attrs.read().get(name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.attrs.read().contains_key(name)
    }

    pub fn set(&self, name: impl Into<String>, value: Value) {
        self.attrs.write().insert(name.into(), value);
    }

    pub fn attribute_names(&self) -> Vec<String> {
        self.attrs.read().keys().cloned().collect()
    }
}

impl fmt::Debug for Module {
    // Пространство имён не печатаем: в нём могут быть другие модули.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("origin", &self.origin)
            .field("is_package", &self.is_package())
            .finish()
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.origin {
            Some(origin) => write!(f, "<module '{}' from '{}'>", self.name, origin),
            None => write!(f, "<module '{}'>", self.name),
        }
    }
}

/// Реестр загруженных модулей.
///
/// Модуль попадает сюда один раз и не вытесняется: повторный импорт того же
/// имени возвращает тот же экземпляр.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    /// Модули по каноническому имени
    modules: HashMap<String, ModuleRef>,
    /// Каноническое имя по источнику
    origins: HashMap<Origin, String>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Зарегистрировать модуль. Побеждает первый: если имя уже занято,
    /// возвращается ранее зарегистрированный экземпляр.
    pub fn register(&mut self, module: ModuleRef) -> ModuleRef {
        if let Some(existing) = self.modules.get(module.name()) {
            warn!("module '{}' is already registered, keeping the first one", module.name());
            return existing.clone();
        }
        if let Some(origin) = module.origin() {
            self.origins
                .entry(origin.clone())
                .or_insert_with(|| module.name().to_string());
        }
        self.modules.insert(module.name().to_string(), module.clone());
        module
    }

    pub fn get(&self, name: &str) -> Option<ModuleRef> {
        self.modules.get(name).cloned()
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    /// Модуль, ранее загруженный из того же источника.
    pub fn by_origin(&self, origin: &Origin) -> Option<ModuleRef> {
        self.origins.get(origin).and_then(|name| self.get(name))
    }

    pub fn all_modules(&self) -> impl Iterator<Item = &ModuleRef> {
        self.modules.values()
    }

    pub fn count(&self) -> usize {
        self.modules.len()
    }

    /// Свободное каноническое имя на основе `stem`: `stem`, `stem_2`, `stem_3`, ...
    pub fn unique_name(&self, stem: &str) -> String {
        if !self.is_loaded(stem) {
            return stem.to_string();
        }
        (2..)
            .map(|n| format!("{}_{}", stem, n))
            .find(|candidate| !self.is_loaded(candidate))
            .unwrap_or_else(|| stem.to_string())
    }
}
