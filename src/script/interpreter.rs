//! Evaluates parsed scripts against the fixed action vocabulary.
//!
//! Evaluation never touches a browser. It yields the tests a script defines,
//! each with its queue of actions, plus whatever configuration errors the
//! script contains. The active test is an explicit field of the evaluation
//! state: an action call used as a statement is appended to it.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use super::lexer::Position;
use super::parser::{Expr, ExprKind, Statement, parse};
use crate::action::Action;
use crate::error::{RegressionError, Result};
use crate::snapshot::validate_name;
use crate::window::{MAX_HEIGHT, MAX_WIDTH, Window};

/// A test defined by a script
#[derive(Debug, Clone, PartialEq)]
pub struct TestDefinition {
    /// Run-wide creation number
    pub id: u32,
    pub name: String,
    pub actions: Vec<Action>,
}

/// Tests of one script, in definition order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Script {
    pub tests: Vec<TestDefinition>,
}

/// Values a script expression can produce
#[derive(Debug, Clone, PartialEq)]
enum Value {
    None,
    Int(i64),
    Float(f64),
    Str(String),
    Window(Window),
    Action(Action),
    Test(u32),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::None => "None",
            Value::Int(_) => "integer",
            Value::Float(_) => "number",
            Value::Str(_) => "string",
            Value::Window(_) => "Window",
            Value::Action(_) => "action",
            Value::Test(_) => "Test",
        }
    }
}

type Builtin = fn(&mut Evaluation<'_>, Args) -> Result<Value>;

/// Every callable name, with legacy aliases next to the canonical ones
const VOCABULARY: &[(&str, Builtin)] = &[
    ("Test", builtin_test),
    ("Window", builtin_window),
    ("navigate", builtin_navigate),
    ("url", builtin_navigate),
    ("resize", builtin_resize),
    ("snapshot", builtin_snapshot),
    ("snap", builtin_snapshot),
    ("wait", builtin_wait),
    ("await_console_message", builtin_await_console_message),
    ("await_output", builtin_await_console_message),
    ("await_window_resize", builtin_await_window_resize),
    ("await_window_change", builtin_await_window_resize),
    ("assert_window_size", builtin_assert_window_size),
    ("ensure_window", builtin_assert_window_size),
    ("group", builtin_group),
];

/// Names scripts may call
pub fn vocabulary() -> impl Iterator<Item = &'static str> {
    VOCABULARY.iter().map(|(name, _)| *name)
}

fn lookup(name: &str) -> Option<Builtin> {
    VOCABULARY
        .iter()
        .find(|(candidate, _)| *candidate == name)
        .map(|(_, builtin)| *builtin)
}

fn config_error(pos: Position, message: impl std::fmt::Display) -> RegressionError {
    RegressionError::config(format!("{}: {}", pos, message))
}

/// Interprets the scripts of one run.
///
/// Test ids and the set of test names span every script interpreted by the
/// same instance, so names must be unique across a whole test suite.
#[derive(Debug, Default)]
pub struct Interpreter {
    next_test_id: u32,
    test_names: HashSet<String>,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate one script's source text
    pub fn interpret(&mut self, source: &str) -> Result<Script> {
        let statements = parse(source)?;
        let mut evaluation = Evaluation {
            interpreter: self,
            tests: Vec::new(),
            active: None,
            bindings: HashMap::new(),
        };
        for statement in &statements {
            evaluation.execute(statement)?;
        }
        if evaluation.tests.is_empty() {
            return Err(RegressionError::config("No tests defined in script"));
        }
        Ok(Script {
            tests: evaluation.tests,
        })
    }
}

/// State of one script evaluation
struct Evaluation<'i> {
    interpreter: &'i mut Interpreter,
    tests: Vec<TestDefinition>,
    /// Index into `tests` of the test receiving actions
    active: Option<usize>,
    bindings: HashMap<String, Value>,
}

impl Evaluation<'_> {
    fn execute(&mut self, statement: &Statement) -> Result<()> {
        match statement {
            Statement::Expr(expr) => {
                if let Value::Action(action) = self.eval(expr)? {
                    self.append(action, expr.pos)?;
                }
                Ok(())
            }
            Statement::Assign { name, value, pos } => {
                if name == "None" || lookup(name).is_some() {
                    return Err(config_error(*pos, format!("cannot assign to '{}'", name)));
                }
                let value = self.eval(value)?;
                self.bindings.insert(name.clone(), value);
                Ok(())
            }
        }
    }

    fn append(&mut self, action: Action, pos: Position) -> Result<()> {
        let Some(index) = self.active else {
            return Err(config_error(
                pos,
                format!("{} used before any Test was defined", action.kind()),
            ));
        };
        self.tests[index].actions.push(action);
        Ok(())
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value> {
        match &expr.kind {
            ExprKind::Int(value) => Ok(Value::Int(*value)),
            ExprKind::Float(value) => Ok(Value::Float(*value)),
            ExprKind::Str(value) => Ok(Value::Str(value.clone())),
            ExprKind::Ident(name) if name == "None" => Ok(Value::None),
            ExprKind::Ident(name) => self
                .bindings
                .get(name)
                .cloned()
                .ok_or_else(|| config_error(expr.pos, format!("undefined name '{}'", name))),
            ExprKind::Call(call) => {
                let builtin = lookup(&call.name)
                    .ok_or_else(|| config_error(expr.pos, format!("unknown function '{}'", call.name)))?;
                let mut args = Args {
                    call: call.name.clone(),
                    pos: expr.pos,
                    positional: Vec::with_capacity(call.args.len()),
                    keyword: Vec::with_capacity(call.kwargs.len()),
                };
                for arg in &call.args {
                    args.positional.push(self.eval(arg)?);
                }
                for (key, arg) in &call.kwargs {
                    args.keyword.push((key.clone(), self.eval(arg)?));
                }
                builtin(self, args)
            }
        }
    }
}

/// Evaluated call arguments
struct Args {
    call: String,
    pos: Position,
    positional: Vec<Value>,
    keyword: Vec<(String, Value)>,
}

impl Args {
    fn error(&self, message: impl std::fmt::Display) -> RegressionError {
        config_error(self.pos, format!("{}(): {}", self.call, message))
    }

    /// Match arguments to parameter names; explicit `None` counts as absent
    fn bind(self, params: &'static [&'static str]) -> Result<Bound> {
        if self.positional.len() > params.len() {
            return Err(self.error(format!(
                "takes at most {} argument(s), {} given",
                params.len(),
                self.positional.len()
            )));
        }
        let mut values: Vec<Option<Value>> = vec![None; params.len()];
        let Args {
            call,
            pos,
            positional,
            keyword,
        } = self;
        let bound_error = |message: String| config_error(pos, format!("{}(): {}", call, message));
        for (slot, value) in positional.into_iter().enumerate() {
            values[slot] = Some(value);
        }
        for (key, value) in keyword {
            let slot = params
                .iter()
                .position(|p| *p == key)
                .ok_or_else(|| bound_error(format!("unexpected keyword argument '{}'", key)))?;
            if values[slot].is_some() {
                return Err(bound_error(format!("argument '{}' given twice", key)));
            }
            values[slot] = Some(value);
        }
        for value in values.iter_mut() {
            if *value == Some(Value::None) {
                *value = None;
            }
        }
        Ok(Bound {
            call,
            pos,
            params,
            values,
        })
    }
}

/// Arguments matched to parameters
struct Bound {
    call: String,
    pos: Position,
    params: &'static [&'static str],
    values: Vec<Option<Value>>,
}

impl Bound {
    fn error(&self, message: impl std::fmt::Display) -> RegressionError {
        config_error(self.pos, format!("{}(): {}", self.call, message))
    }

    /// Re-anchor a position-less configuration error at this call
    fn locate(&self, err: RegressionError) -> RegressionError {
        match err {
            RegressionError::Config(message) => self.error(message),
            other => other,
        }
    }

    fn take(&mut self, slot: usize) -> Option<Value> {
        self.values[slot].take()
    }

    fn required(&mut self, slot: usize) -> Result<Value> {
        self.take(slot)
            .ok_or_else(|| self.error(format!("missing argument '{}'", self.params[slot])))
    }

    fn wrong_type(&self, slot: usize, expected: &str, got: &Value) -> RegressionError {
        self.error(format!(
            "argument '{}' must be {}, got {}",
            self.params[slot],
            expected,
            got.type_name()
        ))
    }

    /// Window dimension in pixels, at most `max` so the outer geometry fits a `u32`
    fn to_dimension(&self, slot: usize, value: Value, max: u32) -> Result<u32> {
        match value {
            Value::Int(n) => u32::try_from(n)
                .ok()
                .filter(|pixels| *pixels <= max)
                .ok_or_else(|| {
                    self.error(format!("argument '{}' out of range: {}", self.params[slot], n))
                }),
            other => Err(self.wrong_type(slot, "a non-negative integer", &other)),
        }
    }

    fn opt_dimension(&mut self, slot: usize, max: u32) -> Result<Option<u32>> {
        self.take(slot).map(|v| self.to_dimension(slot, v, max)).transpose()
    }

    fn string(&mut self, slot: usize) -> Result<String> {
        match self.required(slot)? {
            Value::Str(s) => Ok(s),
            other => Err(self.wrong_type(slot, "a string", &other)),
        }
    }

    fn opt_string(&mut self, slot: usize) -> Result<Option<String>> {
        match self.take(slot) {
            None => Ok(None),
            Some(Value::Str(s)) => Ok(Some(s)),
            Some(other) => Err(self.wrong_type(slot, "a string", &other)),
        }
    }

    fn to_duration(&self, slot: usize, value: Value) -> Result<Duration> {
        let seconds = match value {
            Value::Int(n) => n as f64,
            Value::Float(f) => f,
            other => return Err(self.wrong_type(slot, "a number of seconds", &other)),
        };
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(self.error(format!("argument '{}' must not be negative", self.params[slot])));
        }
        Duration::try_from_secs_f64(seconds).map_err(|_| {
            self.error(format!("argument '{}' out of range: {}", self.params[slot], seconds))
        })
    }

    fn opt_duration(&mut self, slot: usize) -> Result<Option<Duration>> {
        self.take(slot).map(|v| self.to_duration(slot, v)).transpose()
    }
}

// ============================================================================
// Vocabulary
// ============================================================================

fn builtin_test(cx: &mut Evaluation<'_>, args: Args) -> Result<Value> {
    let mut args = args.bind(&["name"])?;
    let name = args.opt_string(0)?;

    let id = cx.interpreter.next_test_id;
    cx.interpreter.next_test_id += 1;
    let name = name.unwrap_or_else(|| format!("test{}", id));
    validate_name("Test", &name).map_err(|e| args.locate(e))?;
    if !cx.interpreter.test_names.insert(name.clone()) {
        return Err(args.error(format!("Tests with identical names: '{}'", name)));
    }

    cx.tests.push(TestDefinition {
        id,
        name,
        actions: Vec::new(),
    });
    cx.active = Some(cx.tests.len() - 1);
    Ok(Value::Test(id))
}

fn builtin_window(_cx: &mut Evaluation<'_>, args: Args) -> Result<Value> {
    let mut args = args.bind(&["width", "height", "name"])?;
    let width = args.required(0)?;
    let width = args.to_dimension(0, width, MAX_WIDTH)?;
    let height = args.required(1)?;
    let height = args.to_dimension(1, height, MAX_HEIGHT)?;
    let name = args.opt_string(2)?;
    if let Some(name) = &name {
        validate_name("Window", name).map_err(|e| args.locate(e))?;
    }
    Ok(Value::Window(Window::new(width, height, name)))
}

fn builtin_navigate(_cx: &mut Evaluation<'_>, args: Args) -> Result<Value> {
    let mut args = args.bind(&["url"])?;
    let url = args.string(0)?;
    Ok(Value::Action(Action::Navigate { url }))
}

fn builtin_resize(_cx: &mut Evaluation<'_>, args: Args) -> Result<Value> {
    let mut args = args.bind(&["width", "height"])?;
    let window = match args.required(0)? {
        Value::Window(window) => {
            if args.take(1).is_some() {
                return Err(args.error("takes either a Window or width and height"));
            }
            window
        }
        width => {
            let width = args.to_dimension(0, width, MAX_WIDTH)?;
            let height = args.required(1)?;
            let height = args.to_dimension(1, height, MAX_HEIGHT)?;
            Window::new(width, height, None)
        }
    };
    Ok(Value::Action(Action::Resize(window)))
}

fn builtin_snapshot(_cx: &mut Evaluation<'_>, args: Args) -> Result<Value> {
    let mut args = args.bind(&["name"])?;
    let label = args.opt_string(0)?;
    Ok(Value::Action(Action::Snapshot { label }))
}

fn builtin_wait(_cx: &mut Evaluation<'_>, args: Args) -> Result<Value> {
    let mut args = args.bind(&["seconds"])?;
    let seconds = args.required(0)?;
    let duration = args.to_duration(0, seconds)?;
    Ok(Value::Action(Action::Wait(duration)))
}

fn builtin_await_console_message(_cx: &mut Evaluation<'_>, args: Args) -> Result<Value> {
    let mut args = args.bind(&["expected", "timeout"])?;
    let expected = args.string(0)?;
    let timeout = args.opt_duration(1)?;
    Ok(Value::Action(Action::AwaitConsoleMessage { expected, timeout }))
}

fn builtin_await_window_resize(_cx: &mut Evaluation<'_>, args: Args) -> Result<Value> {
    let mut args = args.bind(&["timeout"])?;
    let timeout = args.opt_duration(0)?;
    Ok(Value::Action(Action::AwaitWindowResize { timeout }))
}

fn builtin_assert_window_size(_cx: &mut Evaluation<'_>, args: Args) -> Result<Value> {
    let mut args = args.bind(&["width", "height"])?;
    let (width, height) = match args.take(0) {
        Some(Value::Window(window)) => {
            if args.take(1).is_some() {
                return Err(args.error("takes either a Window or width and height"));
            }
            (Some(window.width()), Some(window.height()))
        }
        Some(width) => (
            Some(args.to_dimension(0, width, MAX_WIDTH)?),
            args.opt_dimension(1, MAX_HEIGHT)?,
        ),
        None => (None, args.opt_dimension(1, MAX_HEIGHT)?),
    };
    Ok(Value::Action(Action::AssertWindowSize { width, height }))
}

fn builtin_group(_cx: &mut Evaluation<'_>, args: Args) -> Result<Value> {
    if !args.keyword.is_empty() {
        return Err(args.error("takes no keyword arguments"));
    }
    if args.positional.is_empty() {
        return Err(args.error("needs at least one action"));
    }
    let mut items = Vec::with_capacity(args.positional.len());
    for (index, value) in args.positional.iter().enumerate() {
        match value {
            Value::Action(action) => items.push(action.clone()),
            other => {
                return Err(args.error(format!(
                    "item {} must be an action, got {}",
                    index + 1,
                    other.type_name()
                )));
            }
        }
    }
    Ok(Value::Action(Action::Group(items)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn interpret(source: &str) -> Result<Script> {
        Interpreter::new().interpret(source)
    }

    #[test]
    fn test_actions_append_to_active_test() {
        let script = interpret(
            "Test(\"login\")\nurl(\"localhost:8000\")\nsnap()\nTest()\nresize(800, 600)\nsnapshot(\"after\")",
        )
        .unwrap();
        assert_eq!(script.tests.len(), 2);
        assert_eq!(script.tests[0].name, "login");
        assert_eq!(
            script.tests[0].actions,
            vec![
                Action::Navigate {
                    url: "localhost:8000".to_string()
                },
                Action::Snapshot { label: None },
            ]
        );
        assert_eq!(script.tests[1].name, "test1");
        assert_eq!(
            script.tests[1].actions[0],
            Action::Resize(Window::new(800, 600, None))
        );
    }

    #[test]
    fn test_ids_continue_across_scripts() {
        let mut interpreter = Interpreter::new();
        interpreter.interpret("Test()").unwrap();
        let second = interpreter.interpret("Test()").unwrap();
        assert_eq!(second.tests[0].id, 1);
        assert_eq!(second.tests[0].name, "test1");
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = interpret("Test(\"t\")\nTest(\"t\")").unwrap_err();
        assert!(matches!(err, RegressionError::Config(_)));
        assert!(err.to_string().contains("identical names"));
    }

    #[test]
    fn test_duplicate_names_rejected_across_scripts() {
        let mut interpreter = Interpreter::new();
        interpreter.interpret("Test(\"home\")").unwrap();
        assert!(interpreter.interpret("Test(\"home\")").is_err());
    }

    #[test]
    fn test_action_before_test_rejected() {
        let err = interpret("snap()\nTest()").unwrap_err();
        assert!(err.to_string().contains("snapshot used before any Test"));
    }

    #[test]
    fn test_no_tests_rejected() {
        let err = interpret("# nothing here\n").unwrap_err();
        assert!(err.to_string().contains("No tests defined"));
    }

    #[test]
    fn test_named_window_binding() {
        let script = interpret(
            "desktop = Window(1280, 800, \"desktop\")\nTest()\nresize(desktop)\nensure_window(desktop)",
        )
        .unwrap();
        let actions = &script.tests[0].actions;
        assert_eq!(actions[0], Action::Resize(Window::new(1280, 800, Some("desktop".into()))));
        assert_eq!(
            actions[1],
            Action::AssertWindowSize {
                width: Some(1280),
                height: Some(800)
            }
        );
    }

    #[test]
    fn test_bound_action_is_not_appended_until_used() {
        let script = interpret("home = url(\"example.com\")\nTest()\nsnap()\nhome").unwrap();
        assert_eq!(script.tests[0].actions.len(), 2);
        assert!(matches!(script.tests[0].actions[1], Action::Navigate { .. }));
    }

    #[test]
    fn test_group_of_actions() {
        let script = interpret("Test()\ngroup(resize(800, 600), resize(1024, 768))\nsnap()").unwrap();
        match &script.tests[0].actions[0] {
            Action::Group(items) => assert_eq!(items.len(), 2),
            other => panic!("expected group, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_group_rejected() {
        assert!(interpret("Test()\ngroup()").is_err());
        assert!(interpret("Test()\ngroup(800)").is_err());
    }

    #[test]
    fn test_await_actions_with_timeouts() {
        let script =
            interpret("Test()\nawait_output(\"ready\", timeout=2.5)\nawait_window_change()\nwait(0.1)").unwrap();
        assert_eq!(
            script.tests[0].actions,
            vec![
                Action::AwaitConsoleMessage {
                    expected: "ready".into(),
                    timeout: Some(Duration::from_millis(2500))
                },
                Action::AwaitWindowResize { timeout: None },
                Action::Wait(Duration::from_millis(100)),
            ]
        );
    }

    #[test]
    fn test_keyword_arguments_and_none() {
        let script = interpret("Test(name=\"kw\")\nassert_window_size(height=600)\nsnap(None)").unwrap();
        assert_eq!(script.tests[0].name, "kw");
        assert_eq!(
            script.tests[0].actions[0],
            Action::AssertWindowSize {
                width: None,
                height: Some(600)
            }
        );
        assert_eq!(script.tests[0].actions[1], Action::Snapshot { label: None });
    }

    #[test]
    fn test_argument_errors() {
        assert!(interpret("Test()\nresize(800)").is_err());
        assert!(interpret("Test()\nresize(-1, 600)").is_err());
        assert!(interpret("Test()\nwait(\"long\")").is_err());
        assert!(interpret("Test()\nsnap(1, 2)").is_err());
        assert!(interpret("Test()\nsnap(label=\"x\")").is_err());
        assert!(interpret("Test()\nexec(\"rm -rf /\")").is_err());
        assert!(interpret("Test()\nresize(missing)").is_err());
        assert!(interpret("url = 1").is_err());
    }

    #[test]
    fn test_oversized_durations_rejected() {
        let err = interpret("Test()\nwait(100000000000000000000.0)").unwrap_err();
        assert!(matches!(err, RegressionError::Config(_)));
        assert!(err.to_string().contains("argument 'seconds' out of range"), "{}", err);
        assert!(interpret("Test()\nawait_output(\"x\", timeout=100000000000000000000.0)").is_err());

        let script = interpret("Test()\nawait_output(\"x\", timeout=1000000000000.0)").unwrap();
        assert_eq!(
            script.tests[0].actions[0],
            Action::AwaitConsoleMessage {
                expected: "x".into(),
                timeout: Some(Duration::from_secs(1_000_000_000_000))
            }
        );
    }

    #[test]
    fn test_dimensions_leave_room_for_chrome() {
        let err = interpret("Test()\nresize(4294967295, 600)").unwrap_err();
        assert!(err.to_string().contains("argument 'width' out of range"), "{}", err);
        assert!(interpret("Test()\nresize(Window(4294967295, 1))").is_err());
        assert!(interpret("Test()\nassert_window_size(10, 4294967295)").is_err());
        assert!(interpret("Test()\nassert_window_size(height=4294967210)").is_err());

        let script = interpret("Test()\nresize(4294967285, 4294967209)").unwrap();
        assert_eq!(
            script.tests[0].actions[0],
            Action::Resize(Window::new(MAX_WIDTH, MAX_HEIGHT, None))
        );
    }

    #[test]
    fn test_names_with_separator_rejected() {
        assert!(interpret("Test(\"a:b\")").is_err());
        assert!(interpret("Test()\nresize(Window(1, 1, \"x/y\"))").is_err());
    }

    #[test]
    fn test_error_positions() {
        let err = interpret("Test()\n\n   bogus()").unwrap_err();
        assert!(err.to_string().contains("3:4"), "{}", err);
    }

    #[test]
    fn test_vocabulary_has_aliases() {
        let names: Vec<&str> = vocabulary().collect();
        for name in ["navigate", "url", "snapshot", "snap", "await_output", "ensure_window", "group"] {
            assert!(names.contains(&name), "missing {}", name);
        }
    }
}
