//! Hook dispatch: deciding and performing per-call instrumentation
//!
//! Every operator or sub-module call made through a [`Trace`] is classified
//! once ([`HookType`]) and then handled inline:
//!
//! | Hook            | Calibrating                    | Converted                          |
//! |-----------------|--------------------------------|------------------------------------|
//! | `OpHooks`       | record, observe in/weights/out | quantize in/weights, quantize out  |
//! | `ModuleIoHooks` | rewind cursors, record outputs | same, dequantize float outputs     |
//! | `ArgDequants`   | dequantize args, record        | dequantize args, match             |
//! | `None`          | pass through                   | pass through                       |

mod hook;
mod trace;


pub use hook::{function_hook_type, module_hook_type, HookType};
pub use trace::Trace;
