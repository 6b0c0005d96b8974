//! Загрузчик модулей.
//!
//! Отвечает за поиск, исполнение и регистрацию модулей: по составному имени
//! (через пути поиска и пакеты) и по явному пути в файловой системе.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, trace};

use super::exec;
use super::finder::{self, DirectoryFinder, Finder, Layout, ModuleSpec, Origin};
use super::{Module, ModuleConfig, ModuleRef, ModuleRegistry};
use crate::error::{ImportError, ImportResult};
use crate::parser::parse_module;
use crate::value::Value;

/// Загрузчик модулей.
#[derive(Debug)]
pub struct ModuleLoader {
    config: ModuleConfig,
    layout: Layout,
    /// Реестр загруженных модулей
    registry: ModuleRegistry,
    /// Модули, тело которых исполняется прямо сейчас (для детекции циклов
    /// и доступа пакета к собственным подмодулям во время инициализации)
    loading: HashMap<String, ModuleRef>,
}

impl ModuleLoader {
    pub fn new() -> Self {
        Self::with_config(ModuleConfig::default())
    }

    pub fn with_config(config: ModuleConfig) -> Self {
        Self {
            layout: config.layout(),
            config,
            registry: ModuleRegistry::new(),
            loading: HashMap::new(),
        }
    }

    pub fn with_search_paths(paths: Vec<PathBuf>) -> Self {
        Self::with_config(ModuleConfig {
            search_paths: paths,
            ..ModuleConfig::default()
        })
    }

    /// Использовать переданный реестр вместо пустого.
    pub fn with_registry(mut self, registry: ModuleRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn add_search_path(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if !self.config.search_paths.contains(&path) {
            self.config.search_paths.push(path);
        }
    }

    pub fn remove_search_path(&mut self, path: &Path) -> bool {
        let before = self.config.search_paths.len();
        self.config.search_paths.retain(|p| p != path);
        before != self.config.search_paths.len()
    }

    pub fn config(&self) -> &ModuleConfig {
        &self.config
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ModuleRegistry {
        &mut self.registry
    }

    pub fn into_registry(self) -> ModuleRegistry {
        self.registry
    }

    /// Импортировать модуль по составному имени (`pkg.sub.mod`).
    ///
    /// Родительские пакеты импортируются первыми; импортированный подмодуль
    /// становится атрибутом родителя. Повторный импорт возвращает экземпляр
    /// из реестра.
    pub fn import_module(&mut self, name: &str) -> ImportResult<ModuleRef> {
        validate_name(name)?;

        if let Some(module) = self.registry.get(name) {
            trace!("module '{}' found in registry", name);
            return Ok(module);
        }
        if self.loading.contains_key(name) {
            return Err(ImportError::CircularImport(name.to_string()));
        }

        let (parent, leaf) = match name.rsplit_once('.') {
            Some((parent_name, leaf)) => (Some(self.package_for_child(parent_name)?), leaf),
            None => (None, name),
        };

        // Инициализатор родителя мог уже импортировать этот модуль.
        if let Some(module) = self.registry.get(name) {
            return Ok(module);
        }

        let locations = match &parent {
            Some(package) if package.is_package() => package.search_locations().to_vec(),
            Some(_) => return Err(ImportError::ModuleNotFound(name.to_string())),
            None => self.top_level_finders(),
        };

        let spec = find_in(&locations, leaf)?
            .ok_or_else(|| ImportError::ModuleNotFound(name.to_string()))?;
        let module = self.execute(name, spec)?;

        if let Some(package) = parent {
            package.set(leaf, Value::Module(module.clone()));
        }
        Ok(module)
    }

    /// Загрузить модуль по пути к файлу или к директории-пакету.
    ///
    /// Каноническое имя — имя файла без расширения (или имя директории);
    /// если оно занято модулем из другого источника, к нему добавляется
    /// суффикс `_2`, `_3`, ... Повторная загрузка того же пути возвращает
    /// модуль из реестра.
    pub fn load_from_path(&mut self, path: impl AsRef<Path>) -> ImportResult<ModuleRef> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ImportError::PathNotFound(path.to_path_buf()));
        }

        let canonical = fs::canonicalize(path).map_err(|e| ImportError::io(path, e))?;
        let (file, package_dir) = if canonical.is_dir() {
            let init = canonical.join(self.layout.init_file());
            if !init.is_file() {
                return Err(ImportError::MissingInitializer(path.to_path_buf()));
            }
            (init, Some(canonical.clone()))
        } else {
            (canonical.clone(), None)
        };

        let origin = Origin::File(file.clone());
        if let Some(module) = self.registry.by_origin(&origin) {
            trace!("{} already loaded as '{}'", path.display(), module.name());
            return Ok(module);
        }

        let stem = if package_dir.is_some() {
            canonical.file_name()
        } else {
            canonical.file_stem()
        };
        let stem = sanitize_name(&stem.map(|s| s.to_string_lossy()).unwrap_or_default());
        let name = self.registry.unique_name(&stem);

        let source = fs::read_to_string(&file).map_err(|e| ImportError::io(&file, e))?;
        let spec = ModuleSpec {
            origin,
            source,
            submodule_location: package_dir.map(|dir| {
                Arc::new(DirectoryFinder::new(dir, self.layout.clone())) as Arc<dyn Finder>
            }),
        };

        debug!("loading {} as module '{}'", path.display(), name);
        self.execute(&name, spec)
    }

    /// Модуль, уже загруженный или загружаемый прямо сейчас.
    pub(crate) fn loaded_or_loading(&self, name: &str) -> Option<ModuleRef> {
        self.registry
            .get(name)
            .or_else(|| self.loading.get(name).cloned())
    }

    /// Пакет, в котором надо искать подмодуль. Пакет, чей инициализатор
    /// исполняется прямо сейчас, тоже подходит.
    fn package_for_child(&mut self, parent_name: &str) -> ImportResult<ModuleRef> {
        match self.loading.get(parent_name) {
            Some(package) => Ok(package.clone()),
            None => self.import_module(parent_name),
        }
    }

    /// Хранилища для путей поиска; список строится заново при каждом вызове.
    fn top_level_finders(&self) -> Vec<Arc<dyn Finder>> {
        self.config
            .search_paths
            .iter()
            .filter_map(|entry| finder::finder_for(entry, &self.layout))
            .collect()
    }

    /// Исполнить тело модуля и зарегистрировать его.
    ///
    /// Модуль попадает в реестр только после успешного исполнения.
    fn execute(&mut self, name: &str, spec: ModuleSpec) -> ImportResult<ModuleRef> {
        let forms = parse_module(&spec.source).map_err(|source| ImportError::Parse {
            origin: spec.origin.to_string(),
            source,
        })?;

        let module: ModuleRef = Arc::new(Module::from_spec(name, &spec));
        self.loading.insert(name.to_string(), module.clone());
        let result = exec::execute_body(self, &module, &forms);
        self.loading.remove(name);
        result?;

        debug!("executed module '{}' from {}", name, spec.origin);
        Ok(self.registry.register(module))
    }
}

impl Default for ModuleLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn find_in(locations: &[Arc<dyn Finder>], name: &str) -> ImportResult<Option<ModuleSpec>> {
    for location in locations {
        if let Some(spec) = location.find(name)? {
            return Ok(Some(spec));
        }
    }
    Ok(None)
}

/// Составное имя: непустые сегменты-идентификаторы через точку.
fn validate_name(name: &str) -> ImportResult<()> {
    if name.split('.').all(finder::is_identifier) {
        Ok(())
    } else {
        Err(ImportError::InvalidName(name.to_string()))
    }
}

/// Привести имя файла к допустимому сегменту имени модуля.
fn sanitize_name(stem: &str) -> String {
    let mut name: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();
    if !name.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
        name.insert(0, '_');
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::fs::File;
    use std::io::Write;
    use tempfile::{tempdir, TempDir};

    fn write(root: &Path, relative: &str, contents: &str) -> PathBuf {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut file = File::create(&path).unwrap();
        write!(file, "{}", contents).unwrap();
        path
    }

    fn fixture() -> (TempDir, ModuleLoader) {
        let dir = tempdir().unwrap();
        write(dir.path(), "testmod.asg", "(let TESTVAR 1)");
        write(dir.path(), "testpkg/mod.asg", "(let TESTVAR2 2)");
        write(dir.path(), "testpkg/submod.asg", "(let TESTVAR3 (array 3))");
        let loader = ModuleLoader::with_search_paths(vec![dir.path().to_path_buf()]);
        (dir, loader)
    }

    #[test]
    fn test_loader_creation() {
        let loader = ModuleLoader::new();
        assert_eq!(loader.registry().count(), 0);
    }

    #[test]
    fn test_import_simple_module() {
        let (_dir, mut loader) = fixture();
        let module = loader.import_module("testmod").unwrap();

        assert_eq!(module.name(), "testmod");
        assert_eq!(module.get("TESTVAR"), Some(Value::Int(1)));
        assert!(loader.registry().is_loaded("testmod"));
    }

    #[test]
    fn test_import_is_cached() {
        let (_dir, mut loader) = fixture();
        let first = loader.import_module("testpkg.submod").unwrap();
        let second = loader.import_module("testpkg.submod").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_submodule_becomes_parent_attribute() {
        let (_dir, mut loader) = fixture();
        let submod = loader.import_module("testpkg.submod").unwrap();
        let pkg = loader.registry().get("testpkg").unwrap();

        assert!(pkg.is_package());
        assert_eq!(pkg.get("submod"), Some(Value::Module(submod)));
    }

    #[test]
    fn test_import_missing_module() {
        let (_dir, mut loader) = fixture();
        let err = loader.import_module("nomodule999").unwrap_err();
        assert!(matches!(err, ImportError::ModuleNotFound(ref name) if name == "nomodule999"));

        let err = loader.import_module("testpkg.nothing").unwrap_err();
        assert!(matches!(err, ImportError::ModuleNotFound(ref name) if name == "testpkg.nothing"));
    }

    #[test]
    fn test_plain_module_has_no_submodules() {
        let (_dir, mut loader) = fixture();
        let err = loader.import_module("testmod.inner").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Resolution);
    }

    #[test]
    fn test_invalid_names() {
        let mut loader = ModuleLoader::new();
        for name in ["", "a..b", ".a", "a/b", "1abc"] {
            assert!(matches!(
                loader.import_module(name),
                Err(ImportError::InvalidName(_))
            ));
        }
    }

    #[test]
    fn test_failed_body_is_not_registered() {
        let dir = tempdir().unwrap();
        write(dir.path(), "broken.asg", "(let A 1)\n(raise \"boom\")");
        let mut loader = ModuleLoader::with_search_paths(vec![dir.path().to_path_buf()]);

        let err = loader.import_module("broken").unwrap_err();
        assert!(matches!(err, ImportError::Execution { ref message, .. } if message == "boom"));
        assert!(!loader.registry().is_loaded("broken"));
    }

    #[test]
    fn test_parse_error_names_origin() {
        let dir = tempdir().unwrap();
        write(dir.path(), "bad.asg", "(let A");
        let mut loader = ModuleLoader::with_search_paths(vec![dir.path().to_path_buf()]);

        let err = loader.import_module("bad").unwrap_err();
        assert!(matches!(err, ImportError::Parse { ref origin, .. } if origin.ends_with("bad.asg")));
    }

    #[test]
    fn test_circular_import_detection() {
        let dir = tempdir().unwrap();
        write(dir.path(), "ping.asg", "(import pong)");
        write(dir.path(), "pong.asg", "(import ping)");
        let mut loader = ModuleLoader::with_search_paths(vec![dir.path().to_path_buf()]);

        let err = loader.import_module("ping").unwrap_err();
        assert!(matches!(err, ImportError::CircularImport(ref name) if name == "ping"));
        assert!(!loader.registry().is_loaded("ping"));
    }

    #[test]
    fn test_package_initializer_imports_own_submodule() {
        let dir = tempdir().unwrap();
        write(
            dir.path(),
            "app/mod.asg",
            "(import app.stages)\n(let FIRST app.stages.FIRST)",
        );
        write(dir.path(), "app/stages.asg", "(let FIRST \"clean\")");
        let mut loader = ModuleLoader::with_search_paths(vec![dir.path().to_path_buf()]);

        let app = loader.import_module("app").unwrap();
        assert_eq!(app.get("FIRST"), Some(Value::from("clean")));
        assert!(loader.registry().is_loaded("app.stages"));
    }

    #[test]
    fn test_load_file_from_path() {
        let (dir, mut loader) = fixture();
        let module = loader.load_from_path(dir.path().join("testmod.asg")).unwrap();
        assert!(module.has("TESTVAR"));
    }

    #[test]
    fn test_load_same_path_twice_is_cached() {
        let (dir, _) = fixture();
        let mut loader = ModuleLoader::with_search_paths(vec![]);
        let path = dir.path().join("testmod.asg");

        let first = loader.load_from_path(&path).unwrap();
        let second = loader.load_from_path(&path).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loader.registry().count(), 1);
    }

    #[test]
    fn test_load_path_after_dotted_import_reuses_module() {
        let (dir, mut loader) = fixture();
        let dotted = loader.import_module("testmod").unwrap();
        let by_path = loader.load_from_path(dir.path().join("testmod.asg")).unwrap();
        assert!(Arc::ptr_eq(&dotted, &by_path));
    }

    #[test]
    fn test_load_package_directory_links_submodules() {
        let (dir, _) = fixture();
        let mut loader = ModuleLoader::with_search_paths(vec![]);

        let pkg = loader.load_from_path(dir.path().join("testpkg")).unwrap();
        assert_eq!(pkg.name(), "testpkg");
        assert!(pkg.has("TESTVAR2"));

        let submod = loader.import_module("testpkg.submod").unwrap();
        assert!(submod.has("TESTVAR3"));
        assert_eq!(pkg.get("submod"), Some(Value::Module(submod)));
    }

    #[test]
    fn test_colliding_stems_get_unique_names() {
        let dir = tempdir().unwrap();
        let a = write(dir.path(), "a/testmod.asg", "(let WHERE \"a\")");
        let b = write(dir.path(), "b/testmod.asg", "(let WHERE \"b\")");
        let mut loader = ModuleLoader::with_search_paths(vec![]);

        let first = loader.load_from_path(&a).unwrap();
        let second = loader.load_from_path(&b).unwrap();
        assert_eq!(first.name(), "testmod");
        assert_eq!(second.name(), "testmod_2");
        assert_eq!(second.get("WHERE"), Some(Value::from("b")));
    }

    #[test]
    fn test_load_missing_path() {
        let dir = tempdir().unwrap();
        let mut loader = ModuleLoader::new();
        let err = loader.load_from_path(dir.path().join("nope.asg")).unwrap_err();
        assert!(matches!(err, ImportError::PathNotFound(_)));
        assert_eq!(err.kind(), ErrorKind::Filesystem);
    }

    #[test]
    fn test_load_directory_without_initializer() {
        let dir = tempdir().unwrap();
        write(dir.path(), "plain/data.asg", "");
        let mut loader = ModuleLoader::new();

        let err = loader.load_from_path(dir.path().join("plain")).unwrap_err();
        assert!(matches!(err, ImportError::MissingInitializer(_)));
        assert_eq!(err.kind(), ErrorKind::Filesystem);
        assert_eq!(loader.registry().count(), 0);
    }

    #[test]
    fn test_injected_registry_is_reused() {
        let mut registry = ModuleRegistry::new();
        let preloaded = registry.register(Arc::new(Module::new("builtin")));

        let mut loader = ModuleLoader::new().with_registry(registry);
        let found = loader.import_module("builtin").unwrap();
        assert!(Arc::ptr_eq(&preloaded, &found));
    }

    #[test]
    fn test_non_archive_search_entry_is_skipped() {
        let (dir, _) = fixture();
        let notes = write(dir.path(), "NOTES.txt", "just text");

        let mut loader =
            ModuleLoader::with_search_paths(vec![notes.clone(), dir.path().to_path_buf()]);
        assert!(loader.import_module("testmod").unwrap().has("TESTVAR"));

        let mut loader = ModuleLoader::with_search_paths(vec![dir.path().to_path_buf(), notes]);
        let err = loader.import_module("nomodule999").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Resolution);
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("my plugin"), "my_plugin");
        assert_eq!(sanitize_name("2fast"), "_2fast");
        assert_eq!(sanitize_name("ok_name"), "ok_name");
    }
}
