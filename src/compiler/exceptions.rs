//! Name-indexed exception hierarchy for `tryCatch` handler matching
//! (§9 "Exception type matching"). The runtime has no native exception
//! hierarchy, so this defines a small closed taxonomy and maps declared
//! names onto it; anything unrecognized falls back to the catchall root.

/// The root catchall every declared exception type is implicitly
/// assignable to, matching `tryCatch`'s default grouping.
pub const ROOT_EXCEPTION_TYPE: &str = "Exception";

fn parent_of(name: &str) -> Option<&'static str> {
    match name {
        "IllegalArgumentException"
        | "IllegalStateException"
        | "NullPointerException"
        | "ArithmeticException"
        | "TimeoutException"
        | "TransportError"
        | "AccountNotActiveException"
        | "InsufficientBalanceException"
        | "AccountNotFoundException"
        | "CompensationFailedException" => Some(ROOT_EXCEPTION_TYPE),
        _ => None,
    }
}

/// Whether `thrown` is assignable to `declared` (i.e. a catch clause
/// declaring `declared` would catch an exception of type `thrown`).
pub fn is_assignable(declared: &str, thrown: &str) -> bool {
    if declared == thrown || declared == ROOT_EXCEPTION_TYPE {
        return true;
    }
    let mut current = thrown;
    while let Some(parent) = parent_of(current) {
        if parent == declared {
            return true;
        }
        current = parent;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_is_assignable() {
        assert!(is_assignable("IllegalArgumentException", "IllegalArgumentException"));
    }

    #[test]
    fn root_catches_anything() {
        assert!(is_assignable("Exception", "SomeUnknownException"));
    }

    #[test]
    fn unrelated_types_do_not_match() {
        assert!(!is_assignable("IllegalArgumentException", "TimeoutException"));
    }
}
