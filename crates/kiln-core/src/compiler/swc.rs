//! SWC compiler backend implementation.
//!
//! Pipeline per call: parse → append injected statements → rewrite import
//! specifiers → resolver → strip TypeScript → JSX → hygiene/fixer → emit.
//! Everything before the resolver operates on the raw parsed module, so
//! injected and rewritten nodes go through the same transforms as the
//! original source.

#![allow(clippy::default_trait_access)]
#![allow(clippy::needless_raw_string_hashes)]

use super::options::SourceMapKind;
use super::{CompilerBackend, CompilerError, ImportRewriter, TranspileOutput, TranspileSpec};
use base64::Engine as _;
use swc_common::{
    comments::SingleThreadedComments, sync::Lrc, FileName, Globals, Mark, SourceMap, GLOBALS,
};
use swc_ecma_ast::{
    Decl, DefaultDecl, EsVersion, ExportSpecifier, Module, ModuleDecl, ModuleExportName,
    ModuleItem, Pat, Program, Str,
};
use swc_ecma_codegen::{text_writer::JsWriter, Emitter};
use swc_ecma_parser::{lexer::Lexer, EsSyntax, Parser, StringInput, Syntax, TsSyntax};
use swc_ecma_transforms_base::{fixer::fixer, hygiene::hygiene, resolver};
use swc_ecma_transforms_react::{react, Options as ReactOptions, Runtime};
use swc_ecma_transforms_typescript::strip;
use swc_ecma_visit::FoldWith;

/// SWC-based compiler backend.
///
/// `SwcBackend` is `Send + Sync`; each call builds its own source map and
/// globals, so concurrent calls share nothing.
#[derive(Debug, Clone, Default)]
pub struct SwcBackend {
    _private: (),
}

impl SwcBackend {
    /// Create a new SWC backend with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self { _private: () }
    }

    fn is_typescript(path: &std::path::Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| matches!(ext.to_lowercase().as_str(), "ts" | "tsx" | "mts" | "cts"))
    }

    fn is_jsx(path: &std::path::Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| matches!(ext.to_lowercase().as_str(), "jsx" | "tsx"))
    }
}

impl CompilerBackend for SwcBackend {
    fn name(&self) -> &'static str {
        "swc"
    }

    fn transpile_with(
        &self,
        spec: &TranspileSpec,
        source: &str,
        rewrite: &mut ImportRewriter<'_>,
    ) -> Result<TranspileOutput, CompilerError> {
        let is_ts = Self::is_typescript(&spec.input_path);
        let is_jsx = Self::is_jsx(&spec.input_path);
        compile_with_swc(spec, source, is_ts, is_jsx, rewrite)
    }
}

/// Syntax level for parsing and emit. Both the browser and the embedded V8
/// run ES2022.
const TARGET: EsVersion = EsVersion::Es2022;

fn parse_module(
    cm: &Lrc<SourceMap>,
    name: String,
    source: &str,
    syntax: Syntax,
    target: EsVersion,
    comments: Option<&SingleThreadedComments>,
) -> Result<Module, CompilerError> {
    let fm = cm.new_source_file(Lrc::new(FileName::Custom(name)), source.to_string());
    let lexer = Lexer::new(syntax, target, StringInput::from(&*fm), comments.map(|c| c as &dyn swc_common::comments::Comments));
    let mut parser = Parser::new_from(lexer);

    let module = parser
        .parse_module()
        .map_err(|e| CompilerError::parse_error(format!("Failed to parse: {:?}", e.kind())))?;

    let errors: Vec<String> = parser
        .take_errors()
        .into_iter()
        .map(|e| format!("{:?}", e.kind()))
        .collect();
    if !errors.is_empty() {
        return Err(CompilerError::parse_error(errors.join(", ")));
    }

    Ok(module)
}

fn rewrite_imports(module: &mut Module, rewrite: &mut ImportRewriter<'_>) -> Result<(), CompilerError> {
    for item in &mut module.body {
        let ModuleItem::ModuleDecl(ModuleDecl::Import(import)) = item else {
            continue;
        };
        if let Some(specifier) = rewrite(&import.src.value)? {
            import.src = Box::new(Str {
                span: import.src.span,
                value: specifier.into(),
                raw: None,
            });
        }
    }
    Ok(())
}

fn export_name(name: &ModuleExportName) -> String {
    match name {
        ModuleExportName::Ident(ident) => ident.sym.to_string(),
        ModuleExportName::Str(s) => s.value.to_string(),
    }
}

/// Top-level runtime export names, `default` included, type exports skipped.
fn collect_exports(module: &Module) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let mut push = |name: String| {
        if !names.contains(&name) {
            names.push(name);
        }
    };

    for item in &module.body {
        let ModuleItem::ModuleDecl(decl) = item else {
            continue;
        };
        match decl {
            ModuleDecl::ExportDecl(export) => match &export.decl {
                Decl::Fn(f) if !f.declare => push(f.ident.sym.to_string()),
                Decl::Class(c) if !c.declare => push(c.ident.sym.to_string()),
                Decl::Var(var) if !var.declare => {
                    for declarator in &var.decls {
                        if let Pat::Ident(binding) = &declarator.name {
                            push(binding.id.sym.to_string());
                        }
                    }
                }
                Decl::TsEnum(e) if !e.declare => push(e.id.sym.to_string()),
                _ => {}
            },
            ModuleDecl::ExportNamed(named) if !named.type_only => {
                for specifier in &named.specifiers {
                    match specifier {
                        ExportSpecifier::Named(n) if !n.is_type_only => {
                            push(export_name(n.exported.as_ref().unwrap_or(&n.orig)));
                        }
                        ExportSpecifier::Default(d) => push(d.exported.sym.to_string()),
                        ExportSpecifier::Namespace(ns) => push(export_name(&ns.name)),
                        ExportSpecifier::Named(_) => {}
                    }
                }
            }
            ModuleDecl::ExportDefaultDecl(default) => {
                if !matches!(default.decl, DefaultDecl::TsInterfaceDecl(_)) {
                    push("default".to_string());
                }
            }
            ModuleDecl::ExportDefaultExpr(_) => push("default".to_string()),
            _ => {}
        }
    }

    names
}

fn compile_with_swc(
    spec: &TranspileSpec,
    source: &str,
    is_ts: bool,
    is_jsx: bool,
    rewrite: &mut ImportRewriter<'_>,
) -> Result<TranspileOutput, CompilerError> {
    let cm: Lrc<SourceMap> = Default::default();

    let filename = spec
        .input_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("input.js")
        .to_string();

    let syntax = if is_ts {
        Syntax::Typescript(TsSyntax {
            tsx: is_jsx,
            decorators: true,
            ..Default::default()
        })
    } else {
        Syntax::Es(EsSyntax {
            jsx: is_jsx,
            decorators: true,
            ..Default::default()
        })
    };
    let comments = SingleThreadedComments::default();

    let mut module = parse_module(&cm, filename, source, syntax, TARGET, Some(&comments))?;

    if let Some(inject) = &spec.inject {
        let injected = parse_module(
            &cm,
            "<kiln:inject>".to_string(),
            inject,
            Syntax::Es(EsSyntax::default()),
            TARGET,
            None,
        )?;
        module.body.extend(injected.body);
    }

    rewrite_imports(&mut module, rewrite)?;
    let exports = collect_exports(&module);

    let output = GLOBALS.set(&Globals::default(), || {
        let unresolved_mark = Mark::new();
        let top_level_mark = Mark::new();

        let mut program = Program::Module(module);
        program = program.fold_with(&mut resolver(unresolved_mark, top_level_mark, is_ts));

        if is_ts {
            program = program.fold_with(&mut strip(unresolved_mark, top_level_mark));
        }

        let mut module = match program {
            Program::Module(m) => m,
            Program::Script(s) => Module {
                span: s.span,
                body: s.body.into_iter().map(ModuleItem::Stmt).collect(),
                shebang: s.shebang,
            },
        };

        if is_jsx {
            let react_options = ReactOptions {
                runtime: Some(Runtime::Automatic),
                import_source: Some(spec.jsx_import_source.clone()),
                ..Default::default()
            };

            module = module.fold_with(&mut react(
                cm.clone(),
                Some(&comments),
                react_options,
                top_level_mark,
                unresolved_mark,
            ));
        }

        module = module.fold_with(&mut hygiene());
        module.fold_with(&mut fixer(Some(&comments)))
    });

    let mut buf = Vec::new();
    let mut src_map_buf = Vec::new();
    {
        let writer = JsWriter::new(cm.clone(), "\n", &mut buf, Some(&mut src_map_buf));
        let mut emitter = Emitter {
            cfg: swc_ecma_codegen::Config::default().with_target(TARGET),
            cm: cm.clone(),
            comments: Some(&comments),
            wr: writer,
        };
        emitter
            .emit_module(&output)
            .map_err(|e| CompilerError::transform_error(format!("Failed to emit: {e}")))?;
    }

    let mut code = String::from_utf8(buf)
        .map_err(|e| CompilerError::transform_error(format!("Invalid UTF-8 output: {e}")))?;

    let source_map = match spec.sourcemaps {
        SourceMapKind::None => None,
        SourceMapKind::Inline => {
            let srcmap = cm.build_source_map(&src_map_buf);
            let mut map_buf = Vec::new();
            srcmap.to_writer(&mut map_buf).map_err(|e| {
                CompilerError::transform_error(format!("Failed to write source map: {e}"))
            })?;
            Some(String::from_utf8(map_buf).map_err(|e| {
                CompilerError::transform_error(format!("Invalid UTF-8 source map: {e}"))
            })?)
        }
    };

    if let (SourceMapKind::Inline, Some(map)) = (spec.sourcemaps, &source_map) {
        let encoded = base64::engine::general_purpose::STANDARD.encode(map);
        if !code.ends_with('\n') {
            code.push('\n');
        }
        code.push_str("//# sourceMappingURL=data:application/json;base64,");
        code.push_str(&encoded);
        code.push('\n');
    }

    let mut output = TranspileOutput::new(code).with_exports(exports);
    if let Some(map) = source_map {
        output = output.with_source_map(map);
    }
    Ok(output)
}
