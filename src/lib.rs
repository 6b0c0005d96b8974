//! # ASG Loader
//!
//! Динамическая загрузка модулей ASG: разрешение составных имён в объекты,
//! загрузка модуля по пути, обход пакетов и приведение аргументов
//! к последовательностям.
//!
//! ## Основные модули
//!
//! - [`modules`] - Загрузчик, реестр и хранилища модулей (директории и zip)
//! - [`parser`] - S-Expression парсер исходников модулей
//! - [`value`] - Значения, которые живут в пространствах имён модулей
//! - [`arg_iter`] - Приведение «одного или нескольких» значений к итератору
//! - [`error`] - Ошибки загрузки
//!
//! ## Пример
//!
//! ```rust,ignore
//! use asg_loader::{arg_to_iter, ModuleLoader};
//!
//! let mut loader = ModuleLoader::with_search_paths(vec!["plugins".into()]);
//!
//! // Объект по составному имени
//! let handler = loader.load_object("pipeline.stages.clean")?;
//!
//! // Все модули пакета
//! for module in loader.walk_modules("pipeline")? {
//!     println!("{}", module?);
//! }
//!
//! // Одно значение или несколько
//! let stages: Vec<_> = arg_to_iter(handler).collect();
//! ```

pub mod arg_iter;
pub mod error;
pub mod modules;
pub mod parser;
pub mod value;

// === Re-exports для удобства ===
pub use arg_iter::{arg_to_iter, is_atomic_by_default, Arg, ArgIter, Normalizer};
pub use error::{ErrorKind, ImportError, ImportResult};
pub use modules::{ModuleConfig, ModuleLoader, ModuleRef, ModuleRegistry, ObjectRef, WalkModules};
pub use value::{Record, Value};
