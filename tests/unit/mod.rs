//! Unit tests for longhaul components.
//!
//! These cover the budget guard, the tool-calling loop, the state machine,
//! the checkpoint store, and the watchdog, all without network I/O.

mod test_budget;
mod test_store;
mod test_tool_loop;
mod test_watchdog;
