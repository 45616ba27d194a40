//! OSC 777 container markers understood by container-aware terminals.

use std::io::Write;

const OSC_START: &str = "\x1b]777;";
const OSC_END: &str = "\x1b\\";

pub fn push_marker(container: &str, engine: &str) -> String {
    format!("{OSC_START}container;push;{container};{engine};{container}{OSC_END}")
}

pub fn pop_marker() -> String {
    format!("{OSC_START}container;pop;;{OSC_END}")
}

pub fn emit_container_push(container: &str, engine: &str) {
    if is_interactive_terminal() {
        let _ = std::io::stderr().write_all(push_marker(container, engine).as_bytes());
        let _ = std::io::stderr().flush();
    }
}

pub fn emit_container_pop() {
    if is_interactive_terminal() {
        let _ = std::io::stderr().write_all(pop_marker().as_bytes());
        let _ = std::io::stderr().flush();
    }
}

pub fn stdin_is_terminal() -> bool {
    is_tty(libc::STDIN_FILENO)
}

fn is_interactive_terminal() -> bool {
    is_tty(libc::STDERR_FILENO)
}

#[allow(unsafe_code)]
fn is_tty(fd: libc::c_int) -> bool {
    // SAFETY: isatty() only inspects the descriptor, no side effects.
    unsafe { libc::isatty(fd) != 0 }
}
