//! Colored status output
//!
//! All termcolor operations use `let _ =` to deliberately ignore errors.
//! Status lines are decorative: if stdout/stderr is unavailable (broken pipe,
//! no TTY) the run continues without them.

/// Print a warning with a yellow marker to stderr
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {{
        use ::std::io::Write as _;
        use ::termcolor::WriteColor as _;
        let bufwtr = ::termcolor::BufferWriter::stderr(::termcolor::ColorChoice::Auto);
        let mut buffer = bufwtr.buffer();
        let _ = buffer.set_color(::termcolor::ColorSpec::new().set_fg(Some(::termcolor::Color::Yellow)));
        let _ = write!(&mut buffer, "⚠️  ");
        let _ = buffer.reset();
        let _ = writeln!(&mut buffer, $($arg)*);
        let _ = bufwtr.print(&buffer);
    }};
}

/// Print an error with a red marker to stderr
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {{
        use ::std::io::Write as _;
        use ::termcolor::WriteColor as _;
        let bufwtr = ::termcolor::BufferWriter::stderr(::termcolor::ColorChoice::Auto);
        let mut buffer = bufwtr.buffer();
        let _ = buffer.set_color(::termcolor::ColorSpec::new().set_fg(Some(::termcolor::Color::Red)));
        let _ = write!(&mut buffer, "❌ ");
        let _ = buffer.reset();
        let _ = writeln!(&mut buffer, $($arg)*);
        let _ = bufwtr.print(&buffer);
    }};
}

/// Print a success line with a green check to stdout
#[macro_export]
macro_rules! success {
    ($($arg:tt)*) => {{
        use ::std::io::Write as _;
        use ::termcolor::WriteColor as _;
        let bufwtr = ::termcolor::BufferWriter::stdout(::termcolor::ColorChoice::Auto);
        let mut buffer = bufwtr.buffer();
        let _ = buffer.set_color(::termcolor::ColorSpec::new().set_fg(Some(::termcolor::Color::Green)));
        let _ = write!(&mut buffer, "✓ ");
        let _ = buffer.reset();
        let _ = writeln!(&mut buffer, $($arg)*);
        let _ = bufwtr.print(&buffer);
    }};
}

/// Print a progress line to stdout
#[macro_export]
macro_rules! step {
    ($($arg:tt)*) => {{
        use ::std::io::Write as _;
        use ::termcolor::WriteColor as _;
        let bufwtr = ::termcolor::BufferWriter::stdout(::termcolor::ColorChoice::Auto);
        let mut buffer = bufwtr.buffer();
        let _ = buffer.set_color(::termcolor::ColorSpec::new().set_fg(Some(::termcolor::Color::Blue)));
        let _ = write!(&mut buffer, "→ ");
        let _ = buffer.reset();
        let _ = writeln!(&mut buffer, $($arg)*);
        let _ = bufwtr.print(&buffer);
    }};
}
