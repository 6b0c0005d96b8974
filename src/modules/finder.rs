//! Поиск исходников модулей в директориях и zip-архивах.
//!
//! Оба вида хранилища реализуют один трейт [`Finder`]: найти модуль по
//! имени и перечислить непосредственных потомков (модули и пакеты).
//! Рекурсивный обход пакетов написан один раз поверх этого трейта.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{trace, warn};
use zip::result::ZipError;
use zip::ZipArchive;

use crate::error::{ImportError, ImportResult};

/// Соглашения об именах файлов модулей.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Расширение исходников без точки (`asg`)
    pub extension: String,
    /// Имя файла-инициализатора пакета без расширения (`mod`)
    pub package_init: String,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            extension: "asg".to_string(),
            package_init: "mod".to_string(),
        }
    }
}

impl Layout {
    pub fn module_file(&self, name: &str) -> String {
        format!("{}.{}", name, self.extension)
    }

    pub fn init_file(&self) -> String {
        self.module_file(&self.package_init)
    }

    /// Файл модуля-листа `name`; у инициализатора пакета такого файла нет.
    pub fn leaf_file(&self, name: &str) -> Option<String> {
        (name != self.package_init).then(|| self.module_file(name))
    }

    /// Имя модуля по имени файла; `None` для инициализатора и чужих файлов.
    pub fn module_name<'a>(&self, file_name: &'a str) -> Option<&'a str> {
        let stem = file_name
            .strip_suffix(self.extension.as_str())?
            .strip_suffix('.')?;
        (stem != self.package_init && is_identifier(stem)).then_some(stem)
    }
}

/// Сегмент составного имени: `[A-Za-z_][A-Za-z0-9_-]*`.
pub(crate) fn is_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Откуда был прочитан исходник модуля.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Origin {
    File(PathBuf),
    Archive { archive: PathBuf, member: String },
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::File(path) => write!(f, "{}", path.display()),
            Origin::Archive { archive, member } => {
                write!(f, "{}/{}", archive.display(), member)
            }
        }
    }
}

/// Найденный, но ещё не исполненный модуль.
#[derive(Debug, Clone)]
pub struct ModuleSpec {
    pub origin: Origin,
    pub source: String,
    /// Где искать подмодули; `Some` только у пакетов.
    pub submodule_location: Option<Arc<dyn Finder>>,
}

impl ModuleSpec {
    pub fn is_package(&self) -> bool {
        self.submodule_location.is_some()
    }
}

/// Непосредственный потомок пакета.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Child {
    pub name: String,
    pub is_package: bool,
}

/// Хранилище модулей: директория или префикс внутри архива.
pub trait Finder: fmt::Debug + Send + Sync {
    /// Найти модуль `name` прямо в этом хранилище.
    ///
    /// Файл модуля имеет приоритет над одноимённым пакетом. Имя
    /// инициализатора (`mod`) всегда означает подпакет.
    fn find(&self, name: &str) -> ImportResult<Option<ModuleSpec>>;

    /// Перечислить модули и пакеты этого уровня.
    fn children(&self) -> ImportResult<Vec<Child>>;
}

/// Свести потомков к списку; модуль перекрывает одноимённый пакет, как в `find`.
fn collect_children(packages: Vec<String>, modules: Vec<String>) -> Vec<Child> {
    let mut found = BTreeMap::new();
    for name in packages {
        found.insert(name, true);
    }
    for name in modules {
        found.insert(name, false);
    }
    found
        .into_iter()
        .map(|(name, is_package)| Child { name, is_package })
        .collect()
}

/// Хранилище на обычной директории.
#[derive(Debug, Clone)]
pub struct DirectoryFinder {
    dir: PathBuf,
    layout: Layout,
}

impl DirectoryFinder {
    pub fn new(dir: impl Into<PathBuf>, layout: Layout) -> Self {
        Self {
            dir: dir.into(),
            layout,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn read_spec(&self, file: &Path, package_dir: Option<PathBuf>) -> ImportResult<ModuleSpec> {
        let source = fs::read_to_string(file).map_err(|e| ImportError::io(file, e))?;
        let origin = fs::canonicalize(file).map_err(|e| ImportError::io(file, e))?;
        Ok(ModuleSpec {
            origin: Origin::File(origin),
            source,
            submodule_location: package_dir.map(|dir| {
                Arc::new(DirectoryFinder::new(dir, self.layout.clone())) as Arc<dyn Finder>
            }),
        })
    }
}

impl Finder for DirectoryFinder {
    fn find(&self, name: &str) -> ImportResult<Option<ModuleSpec>> {
        if let Some(file) = self.layout.leaf_file(name).map(|f| self.dir.join(f)) {
            if file.is_file() {
                return self.read_spec(&file, None).map(Some);
            }
        }

        let package_dir = self.dir.join(name);
        let init = package_dir.join(self.layout.init_file());
        if init.is_file() {
            return self.read_spec(&init, Some(package_dir)).map(Some);
        }

        Ok(None)
    }

    fn children(&self) -> ImportResult<Vec<Child>> {
        let entries = fs::read_dir(&self.dir).map_err(|e| ImportError::io(&self.dir, e))?;
        let init = self.layout.init_file();

        let mut packages = Vec::new();
        let mut modules = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ImportError::io(&self.dir, e))?;
            let path = entry.path();
            let Some(file_name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };

            if path.is_dir() {
                if is_identifier(&file_name) && path.join(&init).is_file() {
                    packages.push(file_name);
                }
            } else if let Some(stem) = self.layout.module_name(&file_name) {
                modules.push(stem.to_string());
            }
        }

        trace!(
            "{}: {} packages, {} modules",
            self.dir.display(),
            packages.len(),
            modules.len()
        );
        Ok(collect_children(packages, modules))
    }
}

/// Хранилище внутри zip-архива, лежащего в пути поиска.
///
/// Архив открывается заново при каждом обращении.
#[derive(Debug, Clone)]
pub struct ArchiveFinder {
    archive: PathBuf,
    /// Префикс путей членов архива: `""` или `"pkg/sub/"`
    prefix: String,
    layout: Layout,
}

impl ArchiveFinder {
    pub fn new(archive: impl Into<PathBuf>, layout: Layout) -> Self {
        Self::with_prefix(archive, String::new(), layout)
    }

    fn with_prefix(archive: impl Into<PathBuf>, prefix: String, layout: Layout) -> Self {
        Self {
            archive: archive.into(),
            prefix,
            layout,
        }
    }

    pub fn archive(&self) -> &Path {
        &self.archive
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn open(&self) -> ImportResult<ZipArchive<File>> {
        let file = File::open(&self.archive).map_err(|e| ImportError::io(&self.archive, e))?;
        ZipArchive::new(file).map_err(|e| self.archive_error(e))
    }

    fn archive_error(&self, err: ZipError) -> ImportError {
        ImportError::Archive {
            path: self.archive.clone(),
            message: err.to_string(),
        }
    }

    /// Прочитать член архива; `None`, если его нет.
    fn read_member(
        &self,
        archive: &mut ZipArchive<File>,
        member: &str,
    ) -> ImportResult<Option<String>> {
        let mut file = match archive.by_name(member) {
            Ok(file) => file,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(self.archive_error(e)),
        };
        let mut source = String::new();
        file.read_to_string(&mut source)
            .map_err(|e| ImportError::io(self.archive.join(member), e))?;
        Ok(Some(source))
    }

    fn origin(&self, member: String) -> Origin {
        let archive = fs::canonicalize(&self.archive).unwrap_or_else(|_| self.archive.clone());
        Origin::Archive { archive, member }
    }
}

impl Finder for ArchiveFinder {
    fn find(&self, name: &str) -> ImportResult<Option<ModuleSpec>> {
        let mut archive = self.open()?;

        if let Some(file) = self.layout.leaf_file(name) {
            let member = format!("{}{}", self.prefix, file);
            if let Some(source) = self.read_member(&mut archive, &member)? {
                return Ok(Some(ModuleSpec {
                    origin: self.origin(member),
                    source,
                    submodule_location: None,
                }));
            }
        }

        let package_prefix = format!("{}{}/", self.prefix, name);
        let member = format!("{}{}", package_prefix, self.layout.init_file());
        if let Some(source) = self.read_member(&mut archive, &member)? {
            let location = ArchiveFinder::with_prefix(
                self.archive.clone(),
                package_prefix,
                self.layout.clone(),
            );
            return Ok(Some(ModuleSpec {
                origin: self.origin(member),
                source,
                submodule_location: Some(Arc::new(location)),
            }));
        }

        Ok(None)
    }

    fn children(&self) -> ImportResult<Vec<Child>> {
        let archive = self.open()?;
        let init = self.layout.init_file();

        let mut packages = Vec::new();
        let mut modules = Vec::new();
        for member in archive.file_names() {
            let Some(rest) = member.strip_prefix(self.prefix.as_str()) else {
                continue;
            };
            let parts: Vec<&str> = rest.split('/').collect();
            match parts.as_slice() {
                [file_name] => {
                    if let Some(stem) = self.layout.module_name(file_name) {
                        modules.push(stem.to_string());
                    }
                }
                [dir, file_name] if *file_name == init && is_identifier(dir) => {
                    packages.push(dir.to_string());
                }
                _ => {}
            }
        }

        trace!(
            "{}:{}: {} packages, {} modules",
            self.archive.display(),
            self.prefix,
            packages.len(),
            modules.len()
        );
        Ok(collect_children(packages, modules))
    }
}

/// Хранилище для элемента пути поиска: директория или архив.
///
/// Несуществующие элементы и файлы, которые не читаются как zip,
/// пропускаются.
pub fn finder_for(entry: &Path, layout: &Layout) -> Option<Arc<dyn Finder>> {
    if entry.is_dir() {
        return Some(Arc::new(DirectoryFinder::new(entry, layout.clone())));
    }
    if !entry.is_file() {
        return None;
    }
    let finder = ArchiveFinder::new(entry, layout.clone());
    match finder.open() {
        Ok(_) => Some(Arc::new(finder)),
        Err(err) => {
            warn!("skipping search path entry {}: {}", entry.display(), err);
            None
        }
    }
}
