//! Исполнение тела модуля.
//!
//! Формы верхнего уровня (`let`, `fn`, `import`) заполняют пространство
//! имён модуля; остальные выражения вычисляются ради эффекта.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::{ModuleLoader, ModuleRef};
use crate::error::{ImportError, ImportResult};
use crate::parser::{Atom, SExpr, Spanned};
use crate::value::{Function, Record, Value};

/// Исполнить формы `forms` в пространстве имён `module`.
pub(crate) fn execute_body(
    loader: &mut ModuleLoader,
    module: &ModuleRef,
    forms: &[SExpr],
) -> ImportResult<()> {
    let mut executor = Executor {
        loader,
        module: module.clone(),
    };
    for form in forms {
        executor.exec_top(form)?;
    }
    Ok(())
}

/// Область видимости: локальные имена поверх глобальных имён модуля.
struct Scope {
    locals: HashMap<String, Value>,
    globals: ModuleRef,
}

struct Executor<'a> {
    loader: &'a mut ModuleLoader,
    module: ModuleRef,
}

impl Executor<'_> {
    fn error(&self, message: impl Into<String>) -> ImportError {
        ImportError::execution(self.module.name(), message)
    }

    fn module_scope(&self) -> Scope {
        Scope {
            locals: HashMap::new(),
            globals: self.module.clone(),
        }
    }

    fn exec_top(&mut self, form: &SExpr) -> ImportResult<()> {
        let items = form.as_list().unwrap_or_default();
        match form.form_name() {
            Some("let") => {
                let [_, name, expr] = items else {
                    return Err(self.error("let expects a name and a value"));
                };
                let name = self.binding_name(name)?;
                let scope = self.module_scope();
                let value = self.eval(expr, &scope)?;
                self.module.set(name, value);
            }
            Some("fn") => {
                let function = self.define_function(items)?;
                self.module
                    .set(function.name.clone(), Value::Function(Arc::new(function)));
            }
            Some("import") => self.exec_import(items)?,
            _ => {
                let scope = self.module_scope();
                self.eval(form, &scope)?;
            }
        }
        Ok(())
    }

    fn binding_name(&self, expr: &SExpr) -> ImportResult<String> {
        match expr.as_ident() {
            Some(name) if !name.contains('.') => Ok(name.to_string()),
            _ => Err(self.error("expected a plain name")),
        }
    }

    /// `(fn name (params...) body...)`
    fn define_function(&self, items: &[SExpr]) -> ImportResult<Function> {
        let [_, name, params, body @ ..] = items else {
            return Err(self.error("fn expects a name and a parameter list"));
        };
        let name = self.binding_name(name)?;
        let params = params
            .as_list()
            .ok_or_else(|| self.error(format!("fn {}: expected a parameter list", name)))?
            .iter()
            .map(|param| self.binding_name(param))
            .collect::<ImportResult<Vec<_>>>()?;

        Ok(Function {
            name,
            params,
            body: body.to_vec(),
            module: Arc::downgrade(&self.module),
        })
    }

    /// `(import a.b)` связывает `a`; `(import a.b :as x)` связывает сам `a.b`.
    fn exec_import(&mut self, items: &[SExpr]) -> ImportResult<()> {
        let (target, alias) = match items {
            [_, target] => (target, None),
            [_, target, keyword, alias] if keyword.as_keyword() == Some("as") => {
                (target, Some(self.binding_name(alias)?))
            }
            _ => return Err(self.error("import expects a module name and optional :as alias")),
        };
        let name = target
            .as_ident()
            .or_else(|| target.as_string())
            .ok_or_else(|| self.error("import expects a module name"))?;

        let module = self.loader.import_module(name)?;
        match alias {
            Some(alias) => self.module.set(alias, Value::Module(module)),
            None => {
                let top = name.split('.').next().unwrap_or(name);
                let top_module = self.loader.loaded_or_loading(top).unwrap_or(module);
                // Пакет не хранит ссылку на себя: имя находит `lookup`.
                if !Arc::ptr_eq(&top_module, &self.module) {
                    self.module.set(top, Value::Module(top_module));
                }
            }
        }
        Ok(())
    }

    fn eval(&mut self, expr: &SExpr, scope: &Scope) -> ImportResult<Value> {
        // Глубокая вложенность не должна переполнять стек.
        stacker::maybe_grow(256 * 1024, 8 * 1024 * 1024, || self.eval_inner(expr, scope))
    }

    fn eval_inner(&mut self, expr: &SExpr, scope: &Scope) -> ImportResult<Value> {
        let items = match expr {
            SExpr::Atom(Spanned { value, .. }) => return self.eval_atom(value, scope),
            SExpr::List(Spanned { value, .. }) => value,
        };
        let Some((head, args)) = items.split_first() else {
            return Ok(Value::Unit);
        };

        match expr.form_name() {
            Some("array") => Ok(Value::Array(self.eval_all(args, scope)?)),
            Some("dict") => self.eval_dict(args, scope),
            Some("record") => self.eval_record(args, scope),
            Some("str") => {
                let parts = self.eval_all(args, scope)?;
                Ok(Value::String(parts.iter().map(Value::to_text).collect()))
            }
            Some("if") => match args {
                [cond, then] => {
                    if self.eval(cond, scope)?.is_truthy() {
                        self.eval(then, scope)
                    } else {
                        Ok(Value::Unit)
                    }
                }
                [cond, then, otherwise] => {
                    if self.eval(cond, scope)?.is_truthy() {
                        self.eval(then, scope)
                    } else {
                        self.eval(otherwise, scope)
                    }
                }
                _ => Err(self.error("if expects a condition and one or two branches")),
            },
            Some("raise") => {
                let message = match args {
                    [] => "raised".to_string(),
                    [message] => self.eval(message, scope)?.to_text(),
                    _ => return Err(self.error("raise expects at most one argument")),
                };
                Err(self.error(message))
            }
            Some(op @ ("+" | "-" | "*" | "/" | "%")) => {
                let values = self.eval_all(args, scope)?;
                self.arithmetic(op, values)
            }
            Some(op @ ("==" | "!=" | "<" | ">" | "<=" | ">=")) => {
                let [left, right] = args else {
                    return Err(self.error(format!("{} expects two arguments", op)));
                };
                let left = self.eval(left, scope)?;
                let right = self.eval(right, scope)?;
                self.compare(op, &left, &right)
            }
            Some(form @ ("let" | "fn" | "import")) => Err(self.error(format!(
                "{} is only allowed at module top level",
                form
            ))),
            _ => {
                let callee = self.eval(head, scope)?;
                let args = self.eval_all(args, scope)?;
                self.call(callee, args)
            }
        }
    }

    fn eval_atom(&mut self, atom: &Atom, scope: &Scope) -> ImportResult<Value> {
        match atom {
            Atom::Int(n) => Ok(Value::Int(*n)),
            Atom::Float(f) => Ok(Value::Float(*f)),
            Atom::String(s) => Ok(Value::String(s.clone())),
            Atom::Bool(b) => Ok(Value::Bool(*b)),
            Atom::Ident(name) => self.lookup(name, scope),
            Atom::Keyword(k) => Err(self.error(format!("unexpected keyword :{}", k))),
            Atom::Symbol(s) => Err(self.error(format!("operator {} used as a value", s))),
        }
    }

    fn eval_all(&mut self, exprs: &[SExpr], scope: &Scope) -> ImportResult<Vec<Value>> {
        exprs.iter().map(|expr| self.eval(expr, scope)).collect()
    }

    /// `(dict "k" v ...)`
    fn eval_dict(&mut self, args: &[SExpr], scope: &Scope) -> ImportResult<Value> {
        if args.len() % 2 != 0 {
            return Err(self.error("dict expects key/value pairs"));
        }
        let mut map = BTreeMap::new();
        for pair in args.chunks(2) {
            let key = match self.eval(&pair[0], scope)? {
                Value::String(key) => key,
                other => {
                    return Err(self.error(format!(
                        "dict keys must be strings, got {}",
                        other.type_name()
                    )))
                }
            };
            let value = self.eval(&pair[1], scope)?;
            map.insert(key, value);
        }
        Ok(Value::Dict(map))
    }

    /// `(record Type :field v ...)`
    fn eval_record(&mut self, args: &[SExpr], scope: &Scope) -> ImportResult<Value> {
        let Some((type_name, fields)) = args.split_first() else {
            return Err(self.error("record expects a type name"));
        };
        let mut record = Record::new(self.binding_name(type_name)?);
        if fields.len() % 2 != 0 {
            return Err(self.error("record expects :field value pairs"));
        }
        for pair in fields.chunks(2) {
            let field = pair[0]
                .as_keyword()
                .ok_or_else(|| self.error("record field names must be keywords"))?;
            let value = self.eval(&pair[1], scope)?;
            record.fields.insert(field.to_string(), value);
        }
        Ok(Value::Record(record))
    }

    /// Имя вида `a.b.c`: `a` ищется в локальных, затем в глобальных именах,
    /// остальные сегменты — атрибуты.
    fn lookup(&self, name: &str, scope: &Scope) -> ImportResult<Value> {
        let mut segments = name.split('.');
        let first = segments.next().unwrap_or(name);
        let mut value = scope
            .locals
            .get(first)
            .cloned()
            .or_else(|| scope.globals.get(first))
            .or_else(|| {
                (scope.globals.name() == first).then(|| Value::Module(scope.globals.clone()))
            })
            .ok_or_else(|| self.error(format!("name '{}' is not defined", first)))?;

        for segment in segments {
            value = value.attr(segment).ok_or_else(|| {
                self.error(format!(
                    "'{}' object has no attribute '{}'",
                    value.type_name(),
                    segment
                ))
            })?;
        }
        Ok(value)
    }

    fn call(&mut self, callee: Value, args: Vec<Value>) -> ImportResult<Value> {
        let function = match callee {
            Value::Function(function) => function,
            other => {
                return Err(self.error(format!("'{}' is not callable", other.type_name())));
            }
        };
        if function.params.len() != args.len() {
            return Err(self.error(format!(
                "{} expects {} arguments, got {}",
                function.name,
                function.params.len(),
                args.len()
            )));
        }
        let globals = function.module.upgrade().ok_or_else(|| {
            self.error(format!("module of function {} is no longer loaded", function.name))
        })?;

        let scope = Scope {
            locals: function.params.iter().cloned().zip(args).collect(),
            globals,
        };
        let mut result = Value::Unit;
        for expr in &function.body {
            result = self.eval(expr, &scope)?;
        }
        Ok(result)
    }

    fn arithmetic(&self, op: &str, values: Vec<Value>) -> ImportResult<Value> {
        let mut values = values.into_iter();
        let Some(first) = values.next() else {
            return Err(self.error(format!("{} expects at least one argument", op)));
        };

        let mut rest = values.peekable();
        if rest.peek().is_none() {
            return match (op, first) {
                ("-", Value::Int(n)) => n
                    .checked_neg()
                    .map(Value::Int)
                    .ok_or_else(|| self.error("integer overflow")),
                ("-", Value::Float(f)) => Ok(Value::Float(-f)),
                (_, value) => Ok(value),
            };
        }

        rest.try_fold(first, |acc, value| self.binary(op, acc, value))
    }

    fn binary(&self, op: &str, left: Value, right: Value) -> ImportResult<Value> {
        let overflow = || self.error("integer overflow");
        match (left, right) {
            (Value::Int(a), Value::Int(b)) => match op {
                "+" => a.checked_add(b).map(Value::Int).ok_or_else(overflow),
                "-" => a.checked_sub(b).map(Value::Int).ok_or_else(overflow),
                "*" => a.checked_mul(b).map(Value::Int).ok_or_else(overflow),
                _ if b == 0 => Err(self.error("division by zero")),
                // Деление целых даёт float.
                "/" => Ok(Value::Float(a as f64 / b as f64)),
                _ => a.checked_rem(b).map(Value::Int).ok_or_else(overflow),
            },
            (Value::String(a), Value::String(b)) if op == "+" => Ok(Value::String(a + &b)),
            (left, right) => {
                let (Some(a), Some(b)) = (as_number(&left), as_number(&right)) else {
                    return Err(self.error(format!(
                        "unsupported operand types for {}: {} and {}",
                        op,
                        left.type_name(),
                        right.type_name()
                    )));
                };
                Ok(Value::Float(match op {
                    "+" => a + b,
                    "-" => a - b,
                    "*" => a * b,
                    "/" => a / b,
                    _ => a % b,
                }))
            }
        }
    }

    fn compare(&self, op: &str, left: &Value, right: &Value) -> ImportResult<Value> {
        let ordering = match (left, right) {
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            _ => match (as_number(left), as_number(right)) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => None,
            },
        };

        let result = match (op, ordering) {
            ("==", Some(ordering)) => ordering.is_eq(),
            ("!=", Some(ordering)) => ordering.is_ne(),
            ("==", None) => left == right,
            ("!=", None) => left != right,
            ("<", Some(ordering)) => ordering.is_lt(),
            (">", Some(ordering)) => ordering.is_gt(),
            ("<=", Some(ordering)) => ordering.is_le(),
            (">=", Some(ordering)) => ordering.is_ge(),
            _ => {
                return Err(self.error(format!(
                    "cannot compare {} and {}",
                    left.type_name(),
                    right.type_name()
                )))
            }
        };
        Ok(Value::Bool(result))
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Int(n) => Some(*n as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ImportError;
    use crate::modules::ModuleLoader;
    use crate::value::{Record, Value};
    use std::fs;
    use std::sync::Arc;
    use tempfile::tempdir;

    /// Исполнить исходник как модуль `m` и вернуть значение `name`.
    fn eval_module(source: &str, name: &str) -> Result<Value, ImportError> {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("m.asg"), source).unwrap();
        let mut loader = ModuleLoader::with_search_paths(vec![dir.path().to_path_buf()]);
        let module = loader.import_module("m")?;
        Ok(module.get(name).unwrap_or(Value::Unit))
    }

    fn execution_message(err: ImportError) -> String {
        match err {
            ImportError::Execution { message, .. } => message,
            other => panic!("expected execution error, got {:?}", other),
        }
    }

    #[test]
    fn test_let_and_arithmetic() {
        assert_eq!(eval_module("(let X (+ 1 2 3))", "X").unwrap(), Value::Int(6));
        assert_eq!(eval_module("(let X (- 5))", "X").unwrap(), Value::Int(-5));
        assert_eq!(eval_module("(let X (/ 7 2))", "X").unwrap(), Value::Float(3.5));
        assert_eq!(eval_module("(let X (* 2 1.5))", "X").unwrap(), Value::Float(3.0));
        assert_eq!(
            eval_module("(let X (+ \"ab\" \"cd\"))", "X").unwrap(),
            Value::from("abcd")
        );
    }

    #[test]
    fn test_functions_and_conditionals() {
        let source = "
            (fn square (x) (* x x))
            (fn sign (x) (if (< x 0) -1 (if (== x 0) 0 1)))
            (let A (square 7))
            (let B (sign -3))
        ";
        assert_eq!(eval_module(source, "A").unwrap(), Value::Int(49));
        assert_eq!(eval_module(source, "B").unwrap(), Value::Int(-1));
    }

    #[test]
    fn test_recursive_function() {
        let source = "
            (fn fact (n) (if (<= n 1) 1 (* n (fact (- n 1)))))
            (let F (fact 10))
        ";
        assert_eq!(eval_module(source, "F").unwrap(), Value::Int(3_628_800));
    }

    #[test]
    fn test_collections() {
        let value = eval_module("(let D (dict \"a\" 1 \"b\" (array 1 2)))", "D").unwrap();
        assert_eq!(value.to_string(), "{\"a\": 1, \"b\": [1, 2]}");

        let item = eval_module("(let I (record Item :name \"john\"))", "I").unwrap();
        assert_eq!(
            item,
            Value::from(Record::new("Item").with_field("name", "john".into()))
        );
        assert_eq!(
            eval_module("(let I (record Item :name \"john\")) (let N I.name)", "N").unwrap(),
            Value::from("john")
        );
    }

    #[test]
    fn test_str_concatenation() {
        assert_eq!(
            eval_module("(let S (str \"v\" 1 \"-\" true))", "S").unwrap(),
            Value::from("v1-true")
        );
    }

    #[test]
    fn test_raise_propagates() {
        let err = eval_module("(raise (str \"bad \" 42))", "X").unwrap_err();
        assert_eq!(execution_message(err), "bad 42");
    }

    #[test]
    fn test_undefined_name() {
        let err = eval_module("(let X missing)", "X").unwrap_err();
        assert_eq!(execution_message(err), "name 'missing' is not defined");
    }

    #[test]
    fn test_missing_attribute_in_body() {
        let err = eval_module("(let R (record T :a 1)) (let X R.b)", "X").unwrap_err();
        assert_eq!(execution_message(err), "'T' object has no attribute 'b'");
    }

    #[test]
    fn test_runtime_errors() {
        assert_eq!(
            execution_message(eval_module("(let X (/ 1 0))", "X").unwrap_err()),
            "division by zero"
        );
        assert_eq!(
            execution_message(eval_module("(let X (1 2))", "X").unwrap_err()),
            "'int' is not callable"
        );
        assert_eq!(
            execution_message(eval_module("(fn f (a) a) (let X (f))", "X").unwrap_err()),
            "f expects 1 arguments, got 0"
        );
        assert_eq!(
            execution_message(eval_module("(let X (+ 9223372036854775807 1))", "X").unwrap_err()),
            "integer overflow"
        );
        assert_eq!(
            execution_message(eval_module("(let X (if true (let Y 1) 2))", "X").unwrap_err()),
            "let is only allowed at module top level"
        );
    }

    #[test]
    fn test_import_binds_names() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("lib")).unwrap();
        fs::write(dir.path().join("lib/mod.asg"), "").unwrap();
        fs::write(dir.path().join("lib/util.asg"), "(fn twice (x) (* 2 x)) (let K 21)").unwrap();
        fs::write(
            dir.path().join("main.asg"),
            "(import lib.util)\n(import lib.util :as u)\n(let A (lib.util.twice lib.util.K))\n(let B (u.twice 1))",
        )
        .unwrap();

        let mut loader = ModuleLoader::with_search_paths(vec![dir.path().to_path_buf()]);
        let main = loader.import_module("main").unwrap();
        assert_eq!(main.get("A"), Some(Value::Int(42)));
        assert_eq!(main.get("B"), Some(Value::Int(2)));
        assert_eq!(
            main.get("lib"),
            loader.registry().get("lib").map(Value::Module)
        );
    }

    #[test]
    fn test_package_importing_own_submodule_does_not_bind_itself() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("app")).unwrap();
        fs::write(
            dir.path().join("app/mod.asg"),
            "(import app.stages)\n(fn first () app.stages.FIRST)\n(let FIRST (first))",
        )
        .unwrap();
        fs::write(dir.path().join("app/stages.asg"), "(let FIRST \"clean\")").unwrap();

        let mut loader = ModuleLoader::with_search_paths(vec![dir.path().to_path_buf()]);
        let app = loader.import_module("app").unwrap();
        assert_eq!(app.get("FIRST"), Some(Value::from("clean")));
        assert!(!app.has("app"));
        assert!(app.has("stages"));
        assert_eq!(Arc::strong_count(&app), 2);
    }

    #[test]
    fn test_function_uses_defining_module_globals() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("conf.asg"), "(let BASE 100) (fn add (x) (+ BASE x))").unwrap();
        fs::write(dir.path().join("app.asg"), "(import conf) (let BASE 1) (let R (conf.add 1))")
            .unwrap();

        let mut loader = ModuleLoader::with_search_paths(vec![dir.path().to_path_buf()]);
        let app = loader.import_module("app").unwrap();
        assert_eq!(app.get("R"), Some(Value::Int(101)));
    }
}
