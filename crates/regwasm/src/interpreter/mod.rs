mod executor;
mod num_helpers;
mod stack;
mod values;

#[cfg(not(feature = "std"))]
mod no_std_floats;

use alloc::vec::Vec;
use regwasm_types::ValType;

use executor::Executor;
use stack::{CallFrame, Stack};
pub(crate) use values::UntypedValue;

use crate::{Caller, Error, Function, Result, Store, Trap, WasmValue, log, unlikely};

/// Invoke a function with the given arguments and return its results.
///
/// Every invocation gets a fresh register file sized by the store's [`Config`](crate::Config),
/// including one started by a host function calling back into wasm. The number of invocations
/// active at once is capped by [`Config::invocation_depth`](crate::Config::invocation_depth).
pub(crate) fn invoke(store: &mut Store, func: Function, params: &[WasmValue]) -> Result<Vec<WasmValue>> {
    if unlikely(store.invocations >= store.config.invocation_depth()) {
        log::debug!("invoking {} would exceed {} nested invocations", store.symbolicate(func), store.invocations);
        return Err(Trap::CallStackExhausted.into());
    }

    store.invocations += 1;
    let results = invoke_nested(store, func, params);
    store.invocations -= 1;
    results
}

fn invoke_nested(store: &mut Store, func: Function, params: &[WasmValue]) -> Result<Vec<WasmValue>> {
    let ty = store.func_type(func)?.clone();
    if !types_match(&ty.params, params) {
        log::debug!("invoking {} with {params:?}, expected {:?}", store.symbolicate(func), ty.params);
        return Err(Trap::ParameterTypesMismatch.into());
    }

    let handle = match func {
        Function::Wasm(handle) => handle,
        Function::Host(handle) => {
            let host = store.data.host_funcs.get(handle).ok_or(Error::InvalidStore)?.func.clone();
            store.enter_function(func);
            let results = host.call(Caller { store: &mut *store, instance: None }, params)?;
            check_results(&ty.results, &results)?;
            store.exit_function(func);
            return Ok(results);
        }
    };

    let code = store.compiled_code(handle)?;
    let instance = store.data.wasm_funcs[handle].owner;

    let mut stack = Stack::new(store.config());
    stack.enter_frame(0, &code)?;
    for (slot, param) in stack.regs.iter_mut().zip(params) {
        *slot = (*param).into();
    }

    // the exit is reported by the executor when the entry frame returns
    store.enter_function(func);
    Executor::new(store, &mut stack, CallFrame::new(code, handle, instance, 0)).run_to_completion()?;
    Ok(ty.results.iter().zip(stack.regs.iter()).map(|(ty, slot)| slot.attach_type(*ty)).collect())
}

/// Check the values returned by a host function against its declared results.
pub(crate) fn check_results(expected: &[ValType], results: &[WasmValue]) -> Result<(), Trap> {
    if !types_match(expected, results) {
        log::debug!("host function returned {results:?}, expected {expected:?}");
        return Err(Trap::ResultTypesMismatch);
    }
    Ok(())
}

fn types_match(expected: &[ValType], values: &[WasmValue]) -> bool {
    expected.len() == values.len() && expected.iter().zip(values).all(|(ty, value)| value.val_type() == *ty)
}
