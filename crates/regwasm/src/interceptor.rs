use crate::{Function, Store};

/// Observes function calls, for example to build a call profile.
///
/// Installed with [`Store::set_interceptor`]. Every call of a wasm or host function reports an
/// entry, whether it comes from a top-level invocation, a direct call or a `call_indirect`, and
/// an exit once the function returns. Calls nest: the exit of a function is reported after the
/// exits of everything it called. A trap unwinds the active frames without reporting their exits.
pub trait Interceptor {
    /// Called before the first instruction of `func` runs.
    fn on_enter_function(&self, store: &Store, func: Function) {
        let _ = (store, func);
    }

    /// Called after `func` returned.
    fn on_exit_function(&self, store: &Store, func: Function) {
        let _ = (store, func);
    }
}
