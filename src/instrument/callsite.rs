//! Call-site attribution.
//!
//! The traced handles capture their caller with `#[track_caller]`; that
//! location is used unless it falls inside an ignored module. Otherwise the
//! current stack is captured and the first frame outside the ignored
//! modules and the toolchain wins. No match yields an empty source.

use std::backtrace::Backtrace;
use std::panic::Location;

/// Crates whose frames never count as a call site.
const RUNTIME_CRATES: &[&str] = &["std", "core", "alloc", "backtrace"];

/// Render the call site as `file:line`, or `""` when none qualifies.
pub fn resolve(caller: &'static Location<'static>, ignored: &[String]) -> String {
    if !location_ignored(caller.file(), ignored) {
        return format!("{}:{}", caller.file(), caller.line());
    }
    let trace = Backtrace::force_capture().to_string();
    first_frame(&trace, ignored).unwrap_or_default()
}

fn normalize(module: &str) -> String {
    module.replace('-', "_")
}

/// Does the source path lie under one of the ignored module identifiers?
fn location_ignored(file: &str, ignored: &[String]) -> bool {
    let components: Vec<&str> = file
        .split(['/', '\\'])
        .map(|part| part.strip_suffix(".rs").unwrap_or(part))
        .collect();

    ignored.iter().filter(|m| !m.is_empty()).any(|module| {
        let module = normalize(module);
        let wanted: Vec<&str> = module.split("::").collect();
        components.windows(wanted.len()).any(|window| window == wanted.as_slice())
    })
}

fn symbol_ignored(symbol: &str, ignored: &[String]) -> bool {
    let path = symbol.trim_start_matches('<');
    let crate_name = path.split("::").next().unwrap_or(path);
    if RUNTIME_CRATES.contains(&crate_name) || path.starts_with("__rust") {
        return true;
    }
    ignored.iter().filter(|m| !m.is_empty()).any(|module| {
        let module = normalize(module);
        path == module || path.starts_with(&format!("{}::", module))
    })
}

fn toolchain_path(location: &str) -> bool {
    location.starts_with("/rustc/") || location.contains("/.cargo/registry/")
}

/// `path:line:col` → `path:line`.
fn strip_column(location: &str) -> &str {
    match location.rsplit_once(':') {
        Some((head, col)) if col.chars().all(|c| c.is_ascii_digit()) && head.contains(':') => head,
        _ => location,
    }
}

/// First qualifying frame of a rendered backtrace.
fn first_frame(trace: &str, ignored: &[String]) -> Option<String> {
    let mut symbol: Option<&str> = None;
    for line in trace.lines().map(str::trim) {
        if let Some(location) = line.strip_prefix("at ") {
            if let Some(name) = symbol.take() {
                if !symbol_ignored(name, ignored) && !toolchain_path(location) {
                    return Some(strip_column(location).to_string());
                }
            }
        } else if let Some((index, name)) = line.split_once(": ") {
            if !index.is_empty() && index.chars().all(|c| c.is_ascii_digit()) {
                symbol = Some(name);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACE: &str = "   0: std::backtrace::Backtrace::force_capture
             at /rustc/abc/library/std/src/backtrace.rs:312:13
   1: mongo_drums::instrument::callsite::resolve
             at ./src/instrument/callsite.rs:20:17
   2: <mongo_drums::instrument::interceptor::SampledFind as mongo_drums::instrument::operation::FindOperation>::find
             at ./src/instrument/interceptor.rs:90:9
   3: shop::orm::query
             at ./src/orm.rs:12:5
   4: shop::handlers::list_orders
             at ./src/handlers.rs:44:18
   5: core::ops::function::FnOnce::call_once
             at /rustc/abc/library/core/src/ops/function.rs:250:5";

    fn ignored(modules: &[&str]) -> Vec<String> {
        modules.iter().map(|m| m.to_string()).collect()
    }

    #[test]
    fn test_first_frame_skips_ignored_modules() {
        assert_eq!(
            first_frame(TRACE, &ignored(&["mongo_drums"])).as_deref(),
            Some("./src/orm.rs:12")
        );
        assert_eq!(
            first_frame(TRACE, &ignored(&["mongo-drums", "shop::orm"])).as_deref(),
            Some("./src/handlers.rs:44")
        );
    }

    #[test]
    fn test_no_frame_is_empty_source() {
        assert_eq!(first_frame(TRACE, &ignored(&["mongo_drums", "shop"])), None);
        assert_eq!(first_frame("", &[]), None);
    }

    #[test]
    fn test_location_matching() {
        assert!(location_ignored("src/orm/query.rs", &ignored(&["orm"])));
        assert!(location_ignored("src/shop/orm.rs", &ignored(&["shop::orm"])));
        assert!(!location_ignored("src/handlers.rs", &ignored(&["orm"])));
    }

    #[test]
    fn test_caller_location_used_when_not_ignored() {
        let here = Location::caller();
        let source = resolve(here, &ignored(&["mongo_drums"]));
        assert_eq!(source, format!("{}:{}", here.file(), here.line()));
    }
}
