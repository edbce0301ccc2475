//! Magic handlers.
//!
//! Every handler implements the fixed contract
//! `(ctx, args, raw_rest, line_index) -> DirectiveOutcome` and is
//! registered in [`super::MAGIC_TABLE`].

use super::{substitute_cwd, DirectiveOutcome, MagicCtx, MAGIC_TABLE};
use crate::session::swift_version_report;
use sjk_install::InstallError;
use sjk_types::{Cell, Diagnostic, ExecutionOutcome, MagicDirective, PackageRequest};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Wall-clock target for `%timeit` calibration.
const TIMEIT_TARGET: Duration = Duration::from_millis(200);

fn preprocessor_error(line: usize, message: impl std::fmt::Display) -> Diagnostic {
    Diagnostic::error("PreprocessorError", format!("Line {}: {message}", line + 1))
}

// === Install family ===

pub(super) fn install(
    _ctx: &mut MagicCtx<'_>,
    args: &[String],
    _raw: &str,
    line: usize,
) -> Result<DirectiveOutcome, Diagnostic> {
    if args.len() < 2 {
        return Err(InstallError::BadSpec(format!(
            "Line {}: %install usage: SPEC PRODUCT [PRODUCT ...]",
            line + 1
        ))
        .diagnostic());
    }
    Ok(DirectiveOutcome::Directive(MagicDirective::Install(
        PackageRequest {
            spec: substitute_cwd(&args[0]),
            products: args[1..].to_vec(),
        },
    )))
}

pub(super) fn install_swiftpm_flags(
    _ctx: &mut MagicCtx<'_>,
    args: &[String],
    _raw: &str,
    _line: usize,
) -> Result<DirectiveOutcome, Diagnostic> {
    Ok(DirectiveOutcome::Directive(
        MagicDirective::InstallSwiftpmFlags(args.to_vec()),
    ))
}

pub(super) fn install_extra_include_command(
    _ctx: &mut MagicCtx<'_>,
    _args: &[String],
    raw: &str,
    line: usize,
) -> Result<DirectiveOutcome, Diagnostic> {
    if raw.trim().is_empty() {
        return Err(preprocessor_error(
            line,
            "%install-extra-include-command requires a shell command",
        ));
    }
    Ok(DirectiveOutcome::Directive(
        MagicDirective::InstallExtraIncludeCommand(raw.trim().to_string()),
    ))
}

pub(super) fn install_location(
    _ctx: &mut MagicCtx<'_>,
    _args: &[String],
    raw: &str,
    line: usize,
) -> Result<DirectiveOutcome, Diagnostic> {
    if raw.trim().is_empty() {
        return Err(preprocessor_error(line, "%install-location requires a path"));
    }
    Ok(DirectiveOutcome::Directive(MagicDirective::InstallLocation(
        substitute_cwd(raw.trim()),
    )))
}

// === Source splicing ===

pub(super) fn include(
    ctx: &mut MagicCtx<'_>,
    args: &[String],
    _raw: &str,
    line: usize,
) -> Result<DirectiveOutcome, Diagnostic> {
    if args.len() != 1 {
        return Err(preprocessor_error(
            line,
            "%include must be followed by a file name in quotes",
        ));
    }
    let name = &args[0];
    let search: Vec<PathBuf> = ctx.session.config().include_dirs.clone();
    for dir in &search {
        let candidate = dir.join(name);
        if let Ok(code) = std::fs::read_to_string(&candidate) {
            let content = format!(
                "#sourceLocation(file: \"{name}\", line: 1)\n{code}\n#sourceLocation(file: \"{}\", line: {})",
                ctx.cell_file_name,
                line + 1,
            );
            return Ok(DirectiveOutcome::Replace(
                Some(MagicDirective::Include {
                    name: name.clone(),
                    line,
                }),
                content,
            ));
        }
    }
    Err(preprocessor_error(
        line,
        format!(
            "could not find \"{name}\"; searched {}",
            search
                .iter()
                .map(|d| d.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ),
    ))
}

pub(super) fn system(
    ctx: &mut MagicCtx<'_>,
    _args: &[String],
    raw: &str,
    line: usize,
) -> Result<DirectiveOutcome, Diagnostic> {
    if ctx.session.repl_started() || ctx.session.executed_any() {
        return Err(preprocessor_error(
            line,
            "system commands can only run before any Swift code has executed",
        ));
    }
    let output = std::process::Command::new("sh")
        .arg("-c")
        .arg(raw)
        .output()
        .map_err(|err| preprocessor_error(line, format!("%system failed: {err}")))?;
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    if !text.is_empty() {
        ctx.session.stream_stdout(ctx.header, &text);
    }
    Ok(DirectiveOutcome::Directive(MagicDirective::System(
        raw.to_string(),
    )))
}

// === Search paths, linkage, environment ===

fn single_path_arg(
    args: &[String],
    line: usize,
    name: &str,
) -> Result<String, Diagnostic> {
    match args {
        [path] => Ok(substitute_cwd(path)),
        _ => Err(preprocessor_error(line, format!("%{name} requires one path"))),
    }
}

pub(super) fn swift_library_path(
    _ctx: &mut MagicCtx<'_>,
    args: &[String],
    _raw: &str,
    line: usize,
) -> Result<DirectiveOutcome, Diagnostic> {
    let path = single_path_arg(args, line, "swift_library_path")?;
    Ok(DirectiveOutcome::Directive(
        MagicDirective::SwiftLibraryPath(path),
    ))
}

pub(super) fn swift_module_path(
    _ctx: &mut MagicCtx<'_>,
    args: &[String],
    _raw: &str,
    line: usize,
) -> Result<DirectiveOutcome, Diagnostic> {
    let path = single_path_arg(args, line, "swift_module_path")?;
    Ok(DirectiveOutcome::Directive(MagicDirective::SwiftModulePath(
        path,
    )))
}

pub(super) fn swift_framework_path(
    _ctx: &mut MagicCtx<'_>,
    args: &[String],
    _raw: &str,
    line: usize,
) -> Result<DirectiveOutcome, Diagnostic> {
    let path = single_path_arg(args, line, "swift_framework_path")?;
    Ok(DirectiveOutcome::Directive(
        MagicDirective::SwiftFrameworkPath(path),
    ))
}

pub(super) fn swift_link(
    _ctx: &mut MagicCtx<'_>,
    args: &[String],
    _raw: &str,
    line: usize,
) -> Result<DirectiveOutcome, Diagnostic> {
    match args {
        [symbol] => Ok(DirectiveOutcome::Directive(MagicDirective::SwiftLink(
            symbol.clone(),
        ))),
        _ => Err(preprocessor_error(line, "%swift_link requires one symbol name")),
    }
}

pub(super) fn swift_flags(
    _ctx: &mut MagicCtx<'_>,
    args: &[String],
    _raw: &str,
    line: usize,
) -> Result<DirectiveOutcome, Diagnostic> {
    if args.is_empty() {
        return Err(preprocessor_error(line, "%swift_flags requires at least one flag"));
    }
    Ok(DirectiveOutcome::Directive(MagicDirective::SwiftFlags(
        args.to_vec(),
    )))
}

pub(super) fn swift_env(
    _ctx: &mut MagicCtx<'_>,
    _args: &[String],
    raw: &str,
    line: usize,
) -> Result<DirectiveOutcome, Diagnostic> {
    let Some((name, value)) = raw.trim().split_once('=') else {
        return Err(preprocessor_error(line, "%swift_env usage: NAME=VALUE"));
    };
    if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(preprocessor_error(line, "%swift_env: invalid variable name"));
    }
    Ok(DirectiveOutcome::Directive(MagicDirective::SwiftEnv {
        name: name.to_string(),
        value: value.to_string(),
    }))
}

pub(super) fn swift_config(
    ctx: &mut MagicCtx<'_>,
    _args: &[String],
    _raw: &str,
    _line: usize,
) -> Result<DirectiveOutcome, Diagnostic> {
    let summary = ctx.session.setup().summary();
    ctx.session.stream_stdout(ctx.header, &summary);
    Ok(DirectiveOutcome::Directive(MagicDirective::SwiftConfig))
}

pub(super) fn swiftir_setup(
    _ctx: &mut MagicCtx<'_>,
    args: &[String],
    _raw: &str,
    line: usize,
) -> Result<DirectiveOutcome, Diagnostic> {
    let root = single_path_arg(args, line, "swiftir_setup")?;
    Ok(DirectiveOutcome::Directive(MagicDirective::SwiftIrSetup(
        root,
    )))
}

// === Session operators ===

pub(super) fn help(
    ctx: &mut MagicCtx<'_>,
    _args: &[String],
    _raw: &str,
    _line: usize,
) -> Result<DirectiveOutcome, Diagnostic> {
    ctx.session.stream_stdout(ctx.header, HELP_TEXT);
    Ok(DirectiveOutcome::Handled)
}

const HELP_TEXT: &str = "\
Available magic commands

Session:
  %help                     Show this message
  %lsmagic                  List all magic commands
  %who                      List tracked declarations (best effort)
  %reset [-q]               Restart the Swift process (history kept)
  %timeit CODE              Time CODE; reports min/mean/max
  %env [VAR[=VALUE]]        Show or set environment variables
  %swift-version            Show Swift toolchain information
  %load FILE                Splice a Swift file into this cell
  %save FILE                Save session history to a file
  %history [-n N]           Show the last N submitted cells
  %enable_completion        Enable code completion
  %disable_completion       Disable code completion

Packages (first cell only):
  %install SPEC PRODUCT...          Install a Swift package
  %install-swiftpm-flags FLAGS...   Extra flags for the builder
  %install-extra-include-command C  Shell command yielding -I flags
  %install-location PATH            Override the artifact root

Setup:
  %include \"FILE\"            Splice a helper file into the cell
  %system CMD                 Run a shell command (first cell only)
  %swift_library_path PATH    Prepend a dynamic-loader search path
  %swift_module_path PATH     Prepend a module search path
  %swift_framework_path PATH  Prepend a framework search path (macOS)
  %swift_link SYMBOL          Require SYMBOL to resolve after loads
  %swift_flags FLAGS...       Extra compiler flags for the builder
  %swift_env NAME=VALUE       Set an environment variable
  %swift_config               Show the accumulated setup
  %swiftir_setup ROOT         Library/module/framework paths under ROOT
";

pub(super) fn lsmagic(
    ctx: &mut MagicCtx<'_>,
    _args: &[String],
    _raw: &str,
    _line: usize,
) -> Result<DirectiveOutcome, Diagnostic> {
    let mut names: Vec<&str> = MAGIC_TABLE.iter().map(|(name, _)| *name).collect();
    names.sort_unstable();
    names.dedup();
    let mut text = String::from("Available magics:\n");
    for name in names {
        text.push_str(&format!("  %{name}\n"));
    }
    ctx.session.stream_stdout(ctx.header, &text);
    Ok(DirectiveOutcome::Handled)
}

pub(super) fn who(
    ctx: &mut MagicCtx<'_>,
    _args: &[String],
    _raw: &str,
    _line: usize,
) -> Result<DirectiveOutcome, Diagnostic> {
    let declarations = ctx.session.declarations();
    let text = if declarations.is_empty() {
        "No declarations tracked yet.\n".to_string()
    } else {
        let mut out = String::from("Declarations observed this session (textual, best effort):\n");
        for (kind, name) in declarations {
            out.push_str(&format!("  {kind} {name}\n"));
        }
        out
    };
    ctx.session.stream_stdout(ctx.header, &text);
    Ok(DirectiveOutcome::Handled)
}

pub(super) fn reset(
    ctx: &mut MagicCtx<'_>,
    args: &[String],
    _raw: &str,
    _line: usize,
) -> Result<DirectiveOutcome, Diagnostic> {
    let quiet = args.iter().any(|a| a == "-q" || a == "--quiet");
    ctx.session.reset();
    if !quiet {
        ctx.session.stream_stdout(
            ctx.header,
            "Swift process discarded; execution counter reset. History is preserved.\n",
        );
    }
    Ok(DirectiveOutcome::Handled)
}

pub(super) fn timeit(
    ctx: &mut MagicCtx<'_>,
    _args: &[String],
    raw: &str,
    line: usize,
) -> Result<DirectiveOutcome, Diagnostic> {
    let body = raw.trim();
    if body.is_empty() {
        return Err(preprocessor_error(line, "usage: %timeit CODE"));
    }
    let cell = Cell::new(ctx.cell_number, body);
    let guard = ctx.session.guard();
    let cap = ctx.session.config().timeit_max_iterations.max(1);

    // First run doubles as the calibration sample.
    let started = Instant::now();
    let outcome = ctx.session.execute_swift(&cell, body);
    let first = started.elapsed();
    match &outcome {
        ExecutionOutcome::Interrupted => {
            ctx.session.stream_stdout(ctx.header, "%timeit interrupted\n");
            return Ok(DirectiveOutcome::Handled);
        }
        outcome if !outcome.is_success() => {
            return Err(outcome
                .diagnostic()
                .cloned()
                .unwrap_or_else(|| preprocessor_error(line, "%timeit body failed")));
        }
        _ => {}
    }

    let mut durations = vec![first];
    let planned = if first >= TIMEIT_TARGET {
        1
    } else {
        let per_run = first.as_secs_f64().max(1e-6);
        ((TIMEIT_TARGET.as_secs_f64() / per_run).ceil() as u32).clamp(1, cap)
    };

    for _ in 1..planned {
        if guard.interrupt_pending() {
            ctx.session.stream_stdout(ctx.header, "%timeit interrupted\n");
            break;
        }
        let started = Instant::now();
        let outcome = ctx.session.execute_swift(&cell, body);
        let elapsed = started.elapsed();
        match outcome {
            ExecutionOutcome::Interrupted => {
                ctx.session.stream_stdout(ctx.header, "%timeit interrupted\n");
                break;
            }
            outcome if !outcome.is_success() => {
                return Err(outcome
                    .diagnostic()
                    .cloned()
                    .unwrap_or_else(|| preprocessor_error(line, "%timeit body failed")));
            }
            _ => durations.push(elapsed),
        }
    }

    let to_ms = |d: &Duration| d.as_secs_f64() * 1e3;
    let min = durations.iter().map(to_ms).fold(f64::INFINITY, f64::min);
    let max = durations.iter().map(to_ms).fold(0.0, f64::max);
    let mean = durations.iter().map(to_ms).sum::<f64>() / durations.len() as f64;
    ctx.session.stream_stdout(
        ctx.header,
        &format!(
            "{} iterations: min {min:.3} ms, mean {mean:.3} ms, max {max:.3} ms\n",
            durations.len()
        ),
    );
    Ok(DirectiveOutcome::Handled)
}

pub(super) fn env(
    ctx: &mut MagicCtx<'_>,
    _args: &[String],
    raw: &str,
    _line: usize,
) -> Result<DirectiveOutcome, Diagnostic> {
    let arg = raw.trim();
    if arg.is_empty() {
        let mut vars: Vec<(String, String)> = std::env::vars().collect();
        vars.sort();
        let mut text = format!("Environment variables ({}):\n", vars.len());
        for (name, value) in vars {
            let display = if value.chars().count() > 50 {
                let head: String = value.chars().take(47).collect();
                format!("{head}...")
            } else {
                value
            };
            text.push_str(&format!("  {name}={display}\n"));
        }
        ctx.session.stream_stdout(ctx.header, &text);
    } else if let Some((name, value)) = arg.split_once('=') {
        if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
            ctx.session
                .stream_stderr(ctx.header, "Invalid format. Use: %env VAR=VALUE\n");
        } else {
            std::env::set_var(name, value);
            ctx.session
                .stream_stdout(ctx.header, &format!("Set {name}={value}\n"));
        }
    } else {
        match std::env::var(arg) {
            Ok(value) => ctx
                .session
                .stream_stdout(ctx.header, &format!("{arg}={value}\n")),
            Err(_) => ctx.session.stream_stderr(
                ctx.header,
                &format!("Environment variable '{arg}' not found\n"),
            ),
        }
    }
    Ok(DirectiveOutcome::Handled)
}

pub(super) fn swift_version(
    ctx: &mut MagicCtx<'_>,
    _args: &[String],
    _raw: &str,
    _line: usize,
) -> Result<DirectiveOutcome, Diagnostic> {
    let report = swift_version_report(ctx.session);
    ctx.session.stream_stdout(ctx.header, &report);
    Ok(DirectiveOutcome::Handled)
}

pub(super) fn load(
    ctx: &mut MagicCtx<'_>,
    args: &[String],
    _raw: &str,
    line: usize,
) -> Result<DirectiveOutcome, Diagnostic> {
    let [path] = args else {
        return Err(preprocessor_error(line, "usage: %load FILE"));
    };
    let path = expand_user(path);
    let Ok(code) = std::fs::read_to_string(&path) else {
        ctx.session
            .stream_stderr(ctx.header, &format!("File not found: {}\n", path.display()));
        return Ok(DirectiveOutcome::Handled);
    };
    if path.extension().and_then(|e| e.to_str()) != Some("swift") {
        ctx.session.stream_stdout(
            ctx.header,
            &format!("warning: {} does not have a .swift extension\n", path.display()),
        );
    }
    ctx.session.stream_stdout(
        ctx.header,
        &format!("Loaded {} ({} chars)\n", path.display(), code.chars().count()),
    );
    Ok(DirectiveOutcome::Replace(None, code))
}

pub(super) fn save(
    ctx: &mut MagicCtx<'_>,
    args: &[String],
    _raw: &str,
    line: usize,
) -> Result<DirectiveOutcome, Diagnostic> {
    let [path] = args else {
        return Err(preprocessor_error(line, "usage: %save FILE"));
    };
    let mut path = expand_user(path);
    if path.extension().and_then(|e| e.to_str()) != Some("swift") {
        path.set_extension("swift");
    }
    let history = ctx.session.history();
    if history.is_empty() {
        ctx.session
            .stream_stderr(ctx.header, "No execution history to save.\n");
        return Ok(DirectiveOutcome::Handled);
    }

    let mut out = String::from("// Swift session export\n");
    out.push_str(&format!("// Saved at: {}\n", chrono::Local::now().to_rfc3339()));
    out.push_str(&format!("// Cells: {}\n\n", history.len()));
    for entry in history {
        out.push_str(&format!("// === Cell {} ===\n", entry.number));
        out.push_str(&entry.code);
        if !entry.code.ends_with('\n') {
            out.push('\n');
        }
        out.push('\n');
    }
    let count = history.len();
    match std::fs::write(&path, out) {
        Ok(()) => ctx.session.stream_stdout(
            ctx.header,
            &format!("Saved {} cells to {}\n", count, path.display()),
        ),
        Err(err) => ctx
            .session
            .stream_stderr(ctx.header, &format!("Error saving file: {err}\n")),
    }
    Ok(DirectiveOutcome::Handled)
}

pub(super) fn history(
    ctx: &mut MagicCtx<'_>,
    args: &[String],
    _raw: &str,
    _line: usize,
) -> Result<DirectiveOutcome, Diagnostic> {
    let mut limit = 10usize;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "-n" {
            if let Some(n) = iter.next().and_then(|n| n.parse().ok()) {
                limit = n;
            }
        }
    }

    let history = ctx.session.history();
    let text = if history.is_empty() {
        "No execution history yet.\n".to_string()
    } else {
        let start = history.len().saturating_sub(limit);
        let mut out = String::from("Execution history:\n");
        for entry in &history[start..] {
            let mut preview = entry.code.trim().replace('\n', "↵ ");
            if preview.chars().count() > 60 {
                preview = preview.chars().take(57).collect::<String>() + "...";
            }
            out.push_str(&format!("  [{}] {}\n", entry.number, preview));
        }
        out.push_str(&format!(
            "Showing {} of {} entries\n",
            history.len() - start,
            history.len()
        ));
        out
    };
    ctx.session.stream_stdout(ctx.header, &text);
    Ok(DirectiveOutcome::Handled)
}

pub(super) fn enable_completion(
    ctx: &mut MagicCtx<'_>,
    _args: &[String],
    _raw: &str,
    _line: usize,
) -> Result<DirectiveOutcome, Diagnostic> {
    ctx.session.set_completion_enabled(true);
    ctx.session.stream_stdout(ctx.header, "Completion enabled!\n");
    Ok(DirectiveOutcome::Consumed)
}

pub(super) fn disable_completion(
    ctx: &mut MagicCtx<'_>,
    _args: &[String],
    _raw: &str,
    _line: usize,
) -> Result<DirectiveOutcome, Diagnostic> {
    ctx.session.set_completion_enabled(false);
    ctx.session.stream_stdout(ctx.header, "Completion disabled!\n");
    Ok(DirectiveOutcome::Consumed)
}

fn expand_user(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::super::run;
    use crate::config::KernelConfig;
    use crate::session::Session;
    use sjk_protocol::testing::LoopbackSession;
    use sjk_protocol::{ExecuteRequest, Header, ParentSlot};
    use sjk_repl::testing::ScriptedBackend;
    use sjk_repl::{BridgeHandles, ExecutionGuard, InterruptController};
    use sjk_types::{Cell, MagicDirective};
    use std::path::PathBuf;
    use std::sync::Arc;

    fn session_with(config: KernelConfig) -> (Session, Arc<LoopbackSession>) {
        let guard = Arc::new(ExecutionGuard::new());
        let interrupts = Arc::new(InterruptController::new(Arc::clone(&guard)));
        let iopub = Arc::new(LoopbackSession::new());
        let bridge = BridgeHandles {
            guard,
            interrupts,
            iopub: iopub.clone(),
            parent: ParentSlot::new(),
        };
        let session = Session::new(config, Box::new(ScriptedBackend::new()), bridge);
        (session, iopub)
    }

    fn session() -> (Session, Arc<LoopbackSession>) {
        let mut config = KernelConfig::default();
        config.repl_path = Some(PathBuf::from("/usr/bin/repl_swift"));
        session_with(config)
    }

    fn header() -> Header {
        Header::new("execute_request", "s", "u")
    }

    #[test]
    fn plain_swift_passes_through() {
        let (mut session, _) = session();
        let mut cell = Cell::new(1, "let x = 1\nprint(x)");
        let pre = run(&mut session, &header(), &mut cell).unwrap();
        assert!(!pre.handled);
        assert!(pre.packages.is_empty());
        assert_eq!(pre.source, "let x = 1\nprint(x)");
    }

    #[test]
    fn unknown_magic_is_a_preprocessor_error() {
        let (mut session, _) = session();
        let mut cell = Cell::new(1, "%frobnicate now");
        let err = run(&mut session, &header(), &mut cell).unwrap_err();
        assert_eq!(err.name, "PreprocessorError");
        assert!(err.message.contains("frobnicate"));
        assert!(err.message.starts_with("Line 1:"));
    }

    #[test]
    fn install_directive_is_extracted() {
        let (mut session, _) = session();
        let mut cell = Cell::new(
            1,
            "%install-swiftpm-flags -c release\n%install '.package(path: \"/x\")' F G\nprint(1)",
        );
        let pre = run(&mut session, &header(), &mut cell).unwrap();
        assert_eq!(pre.packages.len(), 1);
        assert_eq!(pre.packages[0].spec, ".package(path: \"/x\")");
        assert_eq!(pre.packages[0].products, vec!["F", "G"]);
        assert_eq!(pre.source.trim(), "print(1)");
        assert_eq!(cell.magics.len(), 2);
    }

    #[test]
    fn two_install_directives_are_rejected() {
        let (mut session, _) = session();
        let mut cell = Cell::new(1, "%install '.package(path: \"/x\")' F\n%install '.package(path: \"/y\")' G");
        let err = run(&mut session, &header(), &mut cell).unwrap_err();
        assert!(err.message.contains("at most one"));
    }

    #[test]
    fn malformed_install_is_bad_spec() {
        let (mut session, _) = session();
        let mut cell = Cell::new(1, "%install OnlyOneArg");
        let err = run(&mut session, &header(), &mut cell).unwrap_err();
        assert_eq!(err.name, "PackageInstallError");
        assert!(err.message.contains("usage"));
    }

    #[test]
    fn include_splices_with_location_directives() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("helper.swift"), "func helper() {}\n").unwrap();
        let mut config = KernelConfig::default();
        config.repl_path = Some(PathBuf::from("/usr/bin/repl_swift"));
        config.include_dirs = vec![dir.path().to_path_buf()];
        let (mut session, _) = session_with(config);

        let mut cell = Cell::new(3, "%include \"helper.swift\"\nhelper()");
        let pre = run(&mut session, &header(), &mut cell).unwrap();
        assert!(pre.source.contains("func helper()"));
        assert!(pre
            .source
            .contains("#sourceLocation(file: \"helper.swift\", line: 1)"));
        assert!(pre
            .source
            .contains("#sourceLocation(file: \"<Cell 3>\", line: 1)"));
        assert!(matches!(
            cell.magics.as_slice(),
            [MagicDirective::Include { .. }]
        ));
    }

    #[test]
    fn missing_include_is_an_error() {
        let (mut session, _) = session();
        let mut cell = Cell::new(1, "%include \"nope.swift\"");
        let err = run(&mut session, &header(), &mut cell).unwrap_err();
        assert!(err.message.contains("could not find"));
    }

    #[test]
    fn search_path_magics_accumulate() {
        let (mut session, _) = session();
        let mut cell = Cell::new(
            1,
            "%swift_library_path /a\n%swift_library_path /b\n%swift_module_path /m\n%swift_link swift_begin\n%swift_flags -Onone -g",
        );
        let pre = run(&mut session, &header(), &mut cell).unwrap();
        assert!(pre.source.trim().is_empty());
        // Prepending: the most recent path wins the front slot.
        assert_eq!(session.setup().library_paths[0], PathBuf::from("/b"));
        assert_eq!(session.setup().library_paths[1], PathBuf::from("/a"));
        assert_eq!(session.setup().module_paths[0], PathBuf::from("/m"));
        assert_eq!(session.setup().linked_symbols, vec!["swift_begin"]);
        assert_eq!(session.setup().extra_flags, vec!["-Onone", "-g"]);
    }

    #[test]
    fn swift_env_records_and_sets() {
        let (mut session, _) = session();
        let mut cell = Cell::new(1, "%swift_env SJK_TEST_ENV_MAGIC=on");
        run(&mut session, &header(), &mut cell).unwrap();
        assert_eq!(std::env::var("SJK_TEST_ENV_MAGIC").as_deref(), Ok("on"));
        assert_eq!(
            session.setup().env,
            vec![("SJK_TEST_ENV_MAGIC".to_string(), "on".to_string())]
        );
        std::env::remove_var("SJK_TEST_ENV_MAGIC");
    }

    #[test]
    fn help_and_lsmagic_render_and_handle_cell() {
        let (mut session, iopub) = session();
        let mut cell = Cell::new(1, "%help");
        let pre = run(&mut session, &header(), &mut cell).unwrap();
        assert!(pre.handled);
        assert!(iopub.stream_text("stdout").contains("%timeit"));

        iopub.clear();
        let mut cell = Cell::new(2, "%lsmagic");
        let pre = run(&mut session, &header(), &mut cell).unwrap();
        assert!(pre.handled);
        assert!(iopub.stream_text("stdout").contains("%swiftir_setup"));
    }

    #[test]
    fn who_reports_tracked_declarations() {
        let (mut session, iopub) = session();
        session.handle_execute(&header(), ExecuteRequest::code("let answer = 42"));
        iopub.clear();

        let mut cell = Cell::new(2, "%who");
        run(&mut session, &header(), &mut cell).unwrap();
        assert!(iopub.stream_text("stdout").contains("let answer"));
    }

    #[test]
    fn timeit_reports_statistics() {
        let (mut session, iopub) = session();
        let mut cell = Cell::new(1, "%timeit print(1)");
        let pre = run(&mut session, &header(), &mut cell).unwrap();
        assert!(pre.handled);
        let text = iopub.stream_text("stdout");
        assert!(text.contains("iterations"));
        assert!(text.contains("min"));
        assert!(text.contains("mean"));
        assert!(text.contains("max"));
    }

    #[test]
    fn timeit_respects_the_iteration_cap() {
        let mut config = KernelConfig::default();
        config.repl_path = Some(PathBuf::from("/usr/bin/repl_swift"));
        config.timeit_max_iterations = 3;
        let (mut session, iopub) = session_with(config);

        let mut cell = Cell::new(1, "%timeit 1 + 1");
        run(&mut session, &header(), &mut cell).unwrap();
        let text = iopub.stream_text("stdout");
        assert!(text.starts_with("3 iterations") || text.starts_with("1 iterations"));
    }

    #[test]
    fn env_set_and_get() {
        let (mut session, iopub) = session();
        let mut cell = Cell::new(1, "%env SJK_ENV_MAGIC_TEST=hello world");
        run(&mut session, &header(), &mut cell).unwrap();
        assert_eq!(
            std::env::var("SJK_ENV_MAGIC_TEST").as_deref(),
            Ok("hello world")
        );

        iopub.clear();
        let mut cell = Cell::new(2, "%env SJK_ENV_MAGIC_TEST");
        run(&mut session, &header(), &mut cell).unwrap();
        assert!(iopub
            .stream_text("stdout")
            .contains("SJK_ENV_MAGIC_TEST=hello world"));
        std::env::remove_var("SJK_ENV_MAGIC_TEST");
    }

    #[test]
    fn history_and_save_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, iopub) = session();
        session.handle_execute(&header(), ExecuteRequest::code("let a = 1"));
        session.handle_execute(&header(), ExecuteRequest::code("let b = 2"));
        iopub.clear();

        let mut cell = Cell::new(3, "%history -n 1");
        run(&mut session, &header(), &mut cell).unwrap();
        let text = iopub.stream_text("stdout");
        assert!(text.contains("[2] let b = 2"));
        assert!(!text.contains("[1] let a = 1"));

        let save_path = dir.path().join("out");
        let mut cell = Cell::new(4, format!("%save {}", save_path.display()));
        run(&mut session, &header(), &mut cell).unwrap();
        let saved = std::fs::read_to_string(dir.path().join("out.swift")).unwrap();
        assert!(saved.contains("// === Cell 1 ==="));
        assert!(saved.contains("let b = 2"));
    }

    #[test]
    fn reset_magic_resets_counter_but_keeps_history() {
        let (mut session, _) = session();
        session.handle_execute(&header(), ExecuteRequest::code("let a = 1"));
        assert_eq!(session.execution_count(), 1);

        let mut cell = Cell::new(2, "%reset -q");
        let pre = run(&mut session, &header(), &mut cell).unwrap();
        assert!(pre.handled);
        assert_eq!(session.execution_count(), 0);
        assert_eq!(session.history().len(), 1);
    }

    #[test]
    fn completion_toggles_are_per_line() {
        let (mut session, _) = session();
        let mut cell = Cell::new(1, "%disable_completion\nlet x = 1");
        let pre = run(&mut session, &header(), &mut cell).unwrap();
        assert!(!session.completion_enabled());
        // The toggle line is consumed, the Swift remains.
        assert_eq!(pre.source.trim(), "let x = 1");

        let mut cell = Cell::new(2, "%enableCompletion");
        run(&mut session, &header(), &mut cell).unwrap();
        assert!(session.completion_enabled());
    }

    #[cfg(unix)]
    #[test]
    fn system_runs_only_before_swift() {
        let (mut session, iopub) = session();
        let mut cell = Cell::new(1, "%system echo from-system");
        run(&mut session, &header(), &mut cell).unwrap();
        assert!(iopub.stream_text("stdout").contains("from-system"));

        session.handle_execute(&header(), ExecuteRequest::code("let x = 1"));
        let mut cell = Cell::new(2, "%system echo nope");
        let err = run(&mut session, &header(), &mut cell).unwrap_err();
        assert!(err.message.contains("before any Swift code"));
    }
}
