//! Обход пакета со всеми вложенными подмодулями.

use std::collections::BTreeSet;

use log::debug;

use super::{ModuleLoader, ModuleRef};
use crate::error::ImportResult;

impl ModuleLoader {
    /// Импортировать `name` и лениво обойти его подмодули.
    ///
    /// Корень импортируется сразу: ошибка в нём возвращается отсюда, а не
    /// из итератора. Дальше порядок — обход в глубину: сначала корень, затем
    /// каждый подмодуль, и для подпакета его собственное поддерево до
    /// следующего соседа. Для обычного модуля итератор выдаёт только его.
    pub fn walk_modules(&mut self, name: &str) -> ImportResult<WalkModules<'_>> {
        let root = self.import_module(name)?;
        debug!("walking modules under '{}'", name);
        Ok(WalkModules {
            loader: self,
            root: Some(root),
            pending: Vec::new(),
            done: false,
        })
    }
}

/// Ленивый обход модулей пакета.
///
/// Каждый шаг импортирует очередной подмодуль. Первая ошибка выдаётся как
/// `Some(Err(_))`, после чего обход заканчивается.
#[derive(Debug)]
pub struct WalkModules<'a> {
    loader: &'a mut ModuleLoader,
    root: Option<ModuleRef>,
    /// Полные имена, ожидающие импорта; вершина стека — следующий
    pending: Vec<String>,
    done: bool,
}

impl WalkModules<'_> {
    /// Положить на стек подмодули пакета (в обратном порядке, чтобы первым
    /// снимался первый по алфавиту).
    fn expand(&mut self, module: &ModuleRef) -> ImportResult<()> {
        if !module.is_package() {
            return Ok(());
        }
        let mut names = BTreeSet::new();
        for location in module.search_locations() {
            for child in location.children()? {
                names.insert(child.name);
            }
        }
        self.pending.extend(
            names
                .into_iter()
                .rev()
                .map(|child| format!("{}.{}", module.name(), child)),
        );
        Ok(())
    }

    fn step(&mut self) -> Option<ImportResult<ModuleRef>> {
        let module = match self.root.take() {
            Some(root) => root,
            None => {
                let name = self.pending.pop()?;
                match self.loader.import_module(&name) {
                    Ok(module) => module,
                    Err(err) => return Some(Err(err)),
                }
            }
        };
        Some(self.expand(&module).map(|()| module))
    }
}

impl Iterator for WalkModules<'_> {
    type Item = ImportResult<ModuleRef>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = self.step();
        if !matches!(item, Some(Ok(_))) {
            self.done = true;
            self.pending.clear();
        }
        item
    }
}

impl std::iter::FusedIterator for WalkModules<'_> {}
