use std::fmt::Display;

/// Verbosity levels for [`log`], ordered low to high. Generalizes
/// `lang_pt::util::logger::Log<T>`'s leveled-enum-plus-`order()` pattern into
/// the flat `LOG[<component>]: <text>` format spec §6 mandates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    Silent,
    Default,
    Verbose,
}

impl Verbosity {
    fn order(self) -> u8 {
        match self {
            Verbosity::Silent => 0,
            Verbosity::Default => 1,
            Verbosity::Verbose => 2,
        }
    }
}

impl Default for Verbosity {
    fn default() -> Self {
        Verbosity::Default
    }
}

/// Render and print a diagnostic log line if `verbosity` permits it.
///
/// `component` identifies the subsystem (e.g. a hook's registration
/// `source`, or a core phase name) and `message` is the free-form text.
/// Output always goes through this one formatting function so the on-disk
/// format (`LOG[<component>]: <text>`) stays exactly in sync with spec §6
/// wherever it's called from.
pub fn log(verbosity: Verbosity, level: Verbosity, component: impl Display, message: impl Display) {
    if verbosity.order() >= level.order() {
        println!("LOG[{component}]: {message}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_ordering() {
        assert!(Verbosity::Verbose > Verbosity::Default);
        assert!(Verbosity::Default > Verbosity::Silent);
    }
}
