//! The cell preprocessor.
//!
//! Splits a raw cell into magic directives and residual Swift. Magic
//! handling is a closed dispatch table keyed by name: adding a magic
//! is a table entry plus a handler implementing the fixed contract
//! `(ctx, args, raw_rest, line_index) -> DirectiveOutcome`.
//!
//! Rules:
//!
//! 1. Lines whose first non-whitespace token is a recognized magic are
//!    consumed and never reach Swift; unknown magics are errors.
//! 2. Magic arguments follow shell-like token splitting ([`split`]).
//! 3. `%include` replaces its own line with the named file's contents,
//!    bracketed by source-location directives restoring the cell
//!    coordinate.
//! 4. Session operators (`%help`, `%who`, `%reset`, `%timeit`, ...)
//!    short-circuit: the preprocessor renders their output and the
//!    cell is handled.
//! 5. The cell's own source-location directive is prepended later, by
//!    the supervisor, exactly once.

mod magics;
pub mod split;

use crate::session::Session;
use sjk_protocol::Header;
use sjk_types::{Cell, Diagnostic, MagicDirective, PackageRequest};
use std::path::Path;

/// Result of preprocessing one cell.
#[derive(Debug, Default)]
pub struct Preprocessed {
    /// A session operator consumed the whole cell.
    pub handled: bool,
    /// Packages extracted from `%install` directives.
    pub packages: Vec<PackageRequest>,
    /// Residual Swift source.
    pub source: String,
}

/// Context handed to magic handlers.
pub(crate) struct MagicCtx<'a> {
    pub session: &'a mut Session,
    pub header: &'a Header,
    pub cell_number: u32,
    pub cell_file_name: String,
}

/// What a magic handler did with its line.
pub(crate) enum DirectiveOutcome {
    /// Line consumed; side effect already applied by the handler.
    Consumed,
    /// The whole cell is handled; stop processing.
    Handled,
    /// Line replaced by spliced content (optionally recorded as a
    /// directive).
    Replace(Option<MagicDirective>, String),
    /// A directive to record and route.
    Directive(MagicDirective),
}

pub(crate) type MagicHandler =
    fn(&mut MagicCtx<'_>, &[String], &str, usize) -> Result<DirectiveOutcome, Diagnostic>;

/// The closed dispatch table.
pub(crate) static MAGIC_TABLE: &[(&str, MagicHandler)] = &[
    ("install", magics::install),
    ("install-swiftpm-flags", magics::install_swiftpm_flags),
    (
        "install-extra-include-command",
        magics::install_extra_include_command,
    ),
    ("install-location", magics::install_location),
    ("include", magics::include),
    ("system", magics::system),
    ("swift_library_path", magics::swift_library_path),
    ("swift_module_path", magics::swift_module_path),
    ("swift_framework_path", magics::swift_framework_path),
    ("swift_link", magics::swift_link),
    ("swift_flags", magics::swift_flags),
    ("swift_env", magics::swift_env),
    ("swift_config", magics::swift_config),
    ("swiftir_setup", magics::swiftir_setup),
    ("help", magics::help),
    ("lsmagic", magics::lsmagic),
    ("who", magics::who),
    ("reset", magics::reset),
    ("timeit", magics::timeit),
    ("env", magics::env),
    ("swift-version", magics::swift_version),
    ("swift_version", magics::swift_version),
    ("load", magics::load),
    ("save", magics::save),
    ("history", magics::history),
    ("enable_completion", magics::enable_completion),
    ("enableCompletion", magics::enable_completion),
    ("disable_completion", magics::disable_completion),
    ("disableCompletion", magics::disable_completion),
];

fn lookup(name: &str) -> Option<MagicHandler> {
    MAGIC_TABLE
        .iter()
        .find(|(magic, _)| *magic == name)
        .map(|(_, handler)| *handler)
}

/// Preprocesses one cell: extracts magics, applies their effects, and
/// returns the residual Swift.
pub fn run(
    session: &mut Session,
    header: &Header,
    cell: &mut Cell,
) -> Result<Preprocessed, Diagnostic> {
    let raw = cell.raw.clone();
    let mut swift_lines: Vec<String> = Vec::new();
    let mut directives: Vec<MagicDirective> = Vec::new();
    let mut packages: Vec<PackageRequest> = Vec::new();
    let mut handled = false;

    for (index, line) in raw.lines().enumerate() {
        let trimmed = line.trim_start();
        let Some(rest) = trimmed.strip_prefix('%') else {
            swift_lines.push(line.to_string());
            continue;
        };
        let (name, remainder) = match rest.split_once(char::is_whitespace) {
            Some((name, remainder)) => (name, remainder.trim()),
            None => (rest.trim_end(), ""),
        };
        let Some(handler) = lookup(name) else {
            return Err(Diagnostic::error(
                "PreprocessorError",
                format!("Line {}: unknown magic command '%{name}'", index + 1),
            )
            .with_hint("Tip: use %lsmagic to list available magic commands"));
        };
        let args = split::split(remainder).map_err(|err| {
            Diagnostic::error(
                "PreprocessorError",
                format!("Line {}: could not parse %{name} arguments: {err}", index + 1),
            )
        })?;

        let outcome = {
            let mut ctx = MagicCtx {
                session: &mut *session,
                header,
                cell_number: cell.number,
                cell_file_name: cell.file_name(),
            };
            handler(&mut ctx, &args, remainder, index)?
        };
        match outcome {
            DirectiveOutcome::Consumed => {}
            DirectiveOutcome::Handled => {
                handled = true;
                break;
            }
            DirectiveOutcome::Replace(directive, content) => {
                if let Some(directive) = directive {
                    directives.push(directive);
                }
                swift_lines.push(content);
            }
            DirectiveOutcome::Directive(directive) => {
                route_directive(session, &directive, &mut packages);
                directives.push(directive);
            }
        }
    }

    if packages.len() > 1 {
        return Err(Diagnostic::error(
            "PreprocessorError",
            "at most one %install directive is allowed per cell",
        )
        .with_hint("Tip: list several products after one SPEC, or split installs across cells"));
    }

    cell.magics = directives;
    cell.swift_source = swift_lines.join("\n");
    Ok(Preprocessed {
        handled,
        packages,
        source: cell.swift_source.clone(),
    })
}

/// Applies a recorded directive's session effect.
fn route_directive(
    session: &mut Session,
    directive: &MagicDirective,
    packages: &mut Vec<PackageRequest>,
) {
    match directive {
        MagicDirective::Install(request) => packages.push(request.clone()),
        MagicDirective::InstallSwiftpmFlags(flags) => session.add_sticky_swiftpm_flags(flags),
        MagicDirective::InstallExtraIncludeCommand(command) => {
            session.add_sticky_include_command(command);
        }
        MagicDirective::InstallLocation(location) => {
            session.set_install_location(Path::new(location));
        }
        MagicDirective::SwiftLibraryPath(path) => {
            session.setup_mut().library_paths.insert(0, path.into());
        }
        MagicDirective::SwiftModulePath(path) => {
            session.setup_mut().module_paths.insert(0, path.into());
        }
        MagicDirective::SwiftFrameworkPath(path) => {
            session.setup_mut().framework_paths.insert(0, path.into());
        }
        MagicDirective::SwiftLink(symbol) => {
            session.setup_mut().linked_symbols.push(symbol.clone());
        }
        MagicDirective::SwiftFlags(flags) => {
            session.setup_mut().extra_flags.extend(flags.iter().cloned());
        }
        MagicDirective::SwiftEnv { name, value } => {
            session.setup_mut().env.push((name.clone(), value.clone()));
            std::env::set_var(name, value);
        }
        MagicDirective::SwiftIrSetup(root) => session.setup_mut().apply_ir_root(Path::new(root)),
        // Display-only or already applied inside the handler.
        MagicDirective::SwiftConfig | MagicDirective::Include { .. } | MagicDirective::System(_) => {
        }
    }
}

/// Substitutes `$cwd` in install specs and locations.
pub(crate) fn substitute_cwd(input: &str) -> String {
    match std::env::current_dir() {
        Ok(cwd) => input.replace("$cwd", &cwd.display().to_string()),
        Err(_) => input.to_string(),
    }
}
