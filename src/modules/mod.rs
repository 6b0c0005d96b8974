//! Система модулей ASG: импорт по составному имени, загрузка по пути,
//! обход пакетов.
//!
//! ## Раскладка на диске
//!
//! ```text
//! plugins/
//!   mod.asg          ; инициализатор: plugins — пакет
//!   csv.asg          ; модуль plugins.csv
//!   stages/
//!     mod.asg        ; пакет plugins.stages
//!     clean.asg      ; модуль plugins.stages.clean
//! ```
//!
//! Та же раскладка может лежать внутри zip-архива, добавленного в путь поиска.
//!
//! ## Пример
//!
//! ```rust,ignore
//! use asg_loader::modules::ModuleLoader;
//!
//! let mut loader = ModuleLoader::with_search_paths(vec!["plugins_root".into()]);
//! let stage = loader.load_object("plugins.stages.clean.run")?;
//! let all = loader.walk_modules("plugins")?.collect::<Result<Vec<_>, _>>()?;
//! ```

mod exec;
mod finder;
mod loader;
mod registry;
mod resolver;
mod walker;

pub use finder::{
    finder_for, ArchiveFinder, Child, DirectoryFinder, Finder, Layout, ModuleSpec, Origin,
};
pub use loader::ModuleLoader;
pub use registry::{Module, ModuleRef, ModuleRegistry};
pub use resolver::ObjectRef;
pub use walker::WalkModules;

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{ImportError, ImportResult};

/// Переменная окружения с дополнительными путями поиска (синтаксис `PATH`).
pub const SEARCH_PATH_ENV: &str = "ASG_PATH";

/// Конфигурация модульной системы.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ModuleConfig {
    /// Пути поиска модулей: директории и zip-архивы
    pub search_paths: Vec<PathBuf>,
    /// Расширение исходников
    pub extension: String,
    /// Имя инициализатора пакета (без расширения)
    pub package_init: String,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        let layout = Layout::default();
        Self {
            search_paths: vec![PathBuf::from(".")],
            extension: layout.extension,
            package_init: layout.package_init,
        }
    }
}

impl ModuleConfig {
    /// Разобрать конфигурацию из TOML. Отсутствующие поля берутся по умолчанию.
    ///
    /// ```toml
    /// search_paths = ["plugins", "vendor/bundle.zip"]
    /// extension = "asg"
    /// package_init = "mod"
    /// ```
    pub fn from_toml_str(source: &str) -> ImportResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| ImportError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> ImportResult<Self> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|e| ImportError::io(path, e))?;
        Self::from_toml_str(&source)
    }

    /// Добавить в начало пути из переменной [`SEARCH_PATH_ENV`].
    pub fn with_env(self) -> Self {
        match std::env::var_os(SEARCH_PATH_ENV) {
            Some(value) => self.with_path_list(&value),
            None => self,
        }
    }

    /// Добавить в начало пути из строки в синтаксисе `PATH`.
    pub fn with_path_list(mut self, list: &OsStr) -> Self {
        let mut paths: Vec<PathBuf> = std::env::split_paths(list)
            .filter(|p| !p.as_os_str().is_empty())
            .collect();
        paths.append(&mut self.search_paths);
        self.search_paths = paths;
        self
    }

    pub fn layout(&self) -> Layout {
        Layout {
            extension: self.extension.clone(),
            package_init: self.package_init.clone(),
        }
    }

    fn validate(&self) -> ImportResult<()> {
        if self.extension.is_empty() || self.extension.contains(['.', '/', '\\']) {
            return Err(ImportError::Config(format!(
                "invalid extension '{}'",
                self.extension
            )));
        }
        if !finder::is_identifier(&self.package_init) {
            return Err(ImportError::Config(format!(
                "invalid package initializer name '{}'",
                self.package_init
            )));
        }
        Ok(())
    }
}
