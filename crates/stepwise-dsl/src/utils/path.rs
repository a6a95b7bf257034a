use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // A reference path addresses a single node: fields and indexes only
    static ref REFERENCE_PATH_REGEX: Regex = Regex::new(
        r"^\$(\.[^.\[\]*?@\s]+|\['[^']*'\]|\[-?\d+\])*$"
    ).unwrap();

    // A general path may also project and filter
    static ref PATH_REGEX: Regex = Regex::new(
        r"^\$(\.[^.\[\]*?@\s]+|\.\*|\['[^']*'\]|\[-?\d+\]|\[\*\]|\[-?\d*:-?\d*(:-?\d+)?\]|\[\?\(.+?\)\])*$"
    ).unwrap();

    static ref INTRINSIC_REGEX: Regex = Regex::new(
        r"^States\.[A-Za-z]+\(.*\)$"
    ).unwrap();
}

/// Whether `path` is a syntactically valid path, including `$$` context paths
pub fn is_valid_path(path: &str) -> bool {
    let body = path.strip_prefix('$').filter(|rest| rest.starts_with('$')).unwrap_or(path);
    PATH_REGEX.is_match(body)
}

/// Whether `path` addresses exactly one node, as `ResultPath` requires
pub fn is_reference_path(path: &str) -> bool {
    REFERENCE_PATH_REGEX.is_match(path)
}

/// Whether `expression` looks like an intrinsic function call such as `States.Format(...)`
pub fn is_intrinsic_call(expression: &str) -> bool {
    INTRINSIC_REGEX.is_match(expression)
}
