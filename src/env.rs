use std::cell::RefCell;
use std::ffi::OsStr;

/// Variable holding the `tracing` filter directive.
pub const LOG_VAR: &str = "MICMAC_LOG";

/// Variable holding the default step limit for `run`.
pub const STEP_LIMIT_VAR: &str = "MICMAC_STEP_LIMIT";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Env {
    step_limit: Option<u64>,
}

thread_local! {
    /// Must only be mutated within `set_env`
    static ENV: RefCell<Option<Env>> = const { RefCell::new(None) };
}

pub fn init() {
    let value = Env {
        step_limit: var_parse(STEP_LIMIT_VAR).filter(|limit| *limit > 0),
    };
    set_env(value);
}

/// Step limit to apply when none is given on the command line.
pub fn step_limit() -> Option<u64> {
    with_env(|env| env.step_limit)
}

fn set_env(value: Env) {
    ENV.with(|env| {
        let mut env = env.borrow_mut();
        assert!(
            env.is_none(),
            "tried to initialize environment state multiple times"
        );
        *env = Some(value);
    });
}

fn with_env<F, R>(callback: F) -> R
where
    F: Fn(&Env) -> R,
{
    ENV.with(|env| {
        let env = env.borrow();
        let env = env.unwrap_or_else(|| {
            panic!("tried to access environment state before initialization");
        });
        callback(&env)
    })
}

fn var_parse(name: impl AsRef<OsStr>) -> Option<u64> {
    let value = std::env::var(name.as_ref()).ok()?;
    match value.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(var = ?name.as_ref(), %value, "ignoring malformed environment variable");
            None
        }
    }
}
