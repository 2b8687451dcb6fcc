//! ES module loader for kiln's embedded runtime.
//!
//! Every specifier is first offered to the [`ModuleHost`] (extensionless
//! project files, TypeScript compilation). Whatever the host declines falls
//! through to Node-style resolution: relative/absolute paths with extension
//! probing, `node:` builtins, and packages from `node_modules`.

use deno_core::error::AnyError;
use deno_core::futures::FutureExt;
use deno_core::{
    ModuleLoadResponse, ModuleLoader, ModuleSource, ModuleSourceCode, ModuleSpecifier, ModuleType,
    RequestedModuleType, ResolutionKind,
};
use kiln_core::{has_source_extension, Directive, ModuleHost};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

/// URL scheme of the synthetic builtin modules.
pub const BUILTIN_SCHEME: &str = "kiln-builtin";

/// Node builtins the bootstrap provides, with the names they export.
const BUILTIN_MODULES: &[(&str, &str)] = &[
    ("async_hooks", "AsyncLocalStorage, createHook, executionAsyncId"),
    ("crypto", "createHash, randomUUID, getRandomValues"),
    ("events", "EventEmitter, once"),
    ("process", "env, cwd, nextTick, argv, platform, version, versions"),
    ("stream", "Readable, Writable, PassThrough, Stream"),
    ("util", "TextEncoder, TextDecoder, inspect, format, inherits, promisify, types"),
];

/// Builtin name for `node:x` or a bare builtin name.
#[must_use]
pub fn builtin_name(specifier: &str) -> Option<&'static str> {
    let name = specifier.strip_prefix("node:").unwrap_or(specifier);
    BUILTIN_MODULES
        .iter()
        .find(|(builtin, _)| *builtin == name)
        .map(|(builtin, _)| *builtin)
}

/// Minimal package.json structure for module resolution.
#[derive(Debug, Deserialize, Default)]
struct PackageJson {
    /// Main entry point (CommonJS or fallback)
    main: Option<String>,
    /// ES module entry point
    module: Option<String>,
    /// Modern exports field
    exports: Option<serde_json::Value>,
    /// Package type (module or commonjs)
    #[serde(rename = "type")]
    pkg_type: Option<String>,
}

fn read_package_json(path: &Path) -> PackageJson {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|content| serde_json::from_str(&content).ok())
        .unwrap_or_default()
}

/// How a module is being requested; selects the `exports` conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionMode {
    Import,
    Require,
}

impl ResolutionMode {
    /// Active conditions. `react-server` makes React hand out its server
    /// builds; `webpack` picks the bundler-flavoured Flight server.
    fn conditions(self) -> &'static [&'static str] {
        match self {
            Self::Import => &["react-server", "node", "webpack", "import", "module", "default"],
            Self::Require => &["react-server", "node", "webpack", "require", "default"],
        }
    }
}

/// How loaded source must be evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleFormat {
    Module,
    CommonJs,
    Json,
}

fn esm_syntax() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r#"(?m)^\s*(?:import\s*[\w{*"']|export\s)"#).ok())
        .as_ref()
}

/// Decide the format of `source` loaded from `path`.
#[must_use]
pub fn module_format(path: &Path, source: &str) -> ModuleFormat {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    match ext {
        "json" => return ModuleFormat::Json,
        "mjs" | "mts" | "ts" | "tsx" => return ModuleFormat::Module,
        "cjs" | "cts" => return ModuleFormat::CommonJs,
        _ => {}
    }

    let package_type = path
        .ancestors()
        .skip(1)
        .map(|dir| dir.join("package.json"))
        .find(|candidate| candidate.is_file())
        .and_then(|pkg| read_package_json(&pkg).pkg_type);
    if package_type.as_deref() == Some("module") {
        return ModuleFormat::Module;
    }

    if esm_syntax().is_some_and(|re| re.is_match(source)) {
        ModuleFormat::Module
    } else {
        ModuleFormat::CommonJs
    }
}

/// Node-style resolution used when the module host declines a specifier.
#[derive(Debug, Clone)]
pub struct NodeResolver {
    cwd: PathBuf,
}

impl NodeResolver {
    #[must_use]
    pub fn new(cwd: PathBuf) -> Self {
        Self { cwd }
    }

    /// Resolve `specifier` as requested from a module in `referrer_dir`.
    pub fn resolve(
        &self,
        specifier: &str,
        referrer_dir: &Path,
        mode: ResolutionMode,
    ) -> Result<PathBuf, AnyError> {
        if specifier.starts_with("./") || specifier.starts_with("../") {
            return self.resolve_with_extensions(&referrer_dir.join(specifier));
        }

        if specifier.starts_with('/') {
            return self.resolve_with_extensions(Path::new(specifier));
        }

        if specifier.starts_with("file://") {
            let url = ModuleSpecifier::parse(specifier)?;
            let path = url
                .to_file_path()
                .map_err(|()| AnyError::msg(format!("Invalid file URL: {specifier}")))?;
            return self.resolve_with_extensions(&path);
        }

        self.resolve_bare_specifier(specifier, referrer_dir, mode)
    }

    /// Try a path as-is, with a JS extension appended, then as a directory.
    fn resolve_with_extensions(&self, path: &Path) -> Result<PathBuf, AnyError> {
        let path = normalize_path(path);
        if path.is_file() {
            return Ok(path);
        }

        let extensions = [".js", ".mjs", ".cjs", ".json", ".ts", ".tsx"];
        for ext in extensions {
            let mut appended = path.as_os_str().to_owned();
            appended.push(ext);
            let appended_path = PathBuf::from(appended);
            if appended_path.is_file() {
                return Ok(appended_path);
            }
        }

        if path.is_dir() {
            let pkg = read_package_json(&path.join("package.json"));
            if let Some(main) = pkg.main {
                if let Ok(resolved) = self.resolve_with_extensions(&path.join(main)) {
                    return Ok(resolved);
                }
            }
            for ext in extensions {
                let index = path.join(format!("index{ext}"));
                if index.is_file() {
                    return Ok(index);
                }
            }
        }

        Err(AnyError::msg(format!(
            "Cannot find module: '{}'",
            path.display()
        )))
    }

    /// Resolve a bare specifier (e.g., 'react' or 'react-dom/server') from node_modules.
    fn resolve_bare_specifier(
        &self,
        specifier: &str,
        referrer_dir: &Path,
        mode: ResolutionMode,
    ) -> Result<PathBuf, AnyError> {
        let (package_name, subpath) = parse_bare_specifier(specifier);
        let package_dir = self.find_package(&package_name, referrer_dir)?;
        let pkg = read_package_json(&package_dir.join("package.json"));

        let export_key = subpath
            .as_ref()
            .map_or_else(|| ".".to_string(), |sub| format!("./{sub}"));
        if let Some(exports) = &pkg.exports {
            if let Some(entry) = resolve_exports(exports, &export_key, mode.conditions()) {
                return self.resolve_with_extensions(&package_dir.join(entry));
            }
            if subpath.is_some() {
                return Err(AnyError::msg(format!(
                    "Package subpath '{export_key}' is not exported by '{package_name}'"
                )));
            }
        }

        if let Some(subpath) = subpath {
            return self.resolve_with_extensions(&package_dir.join(subpath));
        }

        self.resolve_package_entry(&package_dir, &package_name, &pkg, mode)
    }

    /// Find a package in node_modules, walking up from the referrer, then from cwd.
    fn find_package(&self, package_name: &str, referrer_dir: &Path) -> Result<PathBuf, AnyError> {
        for start in [referrer_dir, self.cwd.as_path()] {
            for dir in start.ancestors() {
                let package_dir = dir.join("node_modules").join(package_name);
                if package_dir.is_dir() {
                    return Ok(package_dir);
                }
            }
        }

        Err(AnyError::msg(format!(
            "Cannot find package '{package_name}' in node_modules"
        )))
    }

    /// Entry point of a package without usable `exports`.
    fn resolve_package_entry(
        &self,
        package_dir: &Path,
        package_name: &str,
        pkg: &PackageJson,
        mode: ResolutionMode,
    ) -> Result<PathBuf, AnyError> {
        let fields = match mode {
            ResolutionMode::Import => [pkg.module.as_ref(), pkg.main.as_ref()],
            ResolutionMode::Require => [pkg.main.as_ref(), None],
        };
        for field in fields.into_iter().flatten() {
            if let Ok(path) = self.resolve_with_extensions(&package_dir.join(field)) {
                return Ok(path);
            }
        }

        self.resolve_with_extensions(&package_dir.join("index"))
            .map_err(|_| {
                AnyError::msg(format!(
                    "Cannot find entry point for package '{package_name}'"
                ))
            })
    }
}

/// Normalize a path by removing `.` and resolving `..` components.
fn normalize_path(path: &Path) -> PathBuf {
    use std::path::Component;
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                result.pop();
            }
            other => result.push(other),
        }
    }
    result
}

/// Parse a bare specifier into package name and optional subpath.
/// - 'react' -> ('react', None)
/// - 'react-dom/server' -> ('react-dom', Some('server'))
/// - '@scope/pkg' -> ('@scope/pkg', None)
/// - '@scope/pkg/sub' -> ('@scope/pkg', Some('sub'))
fn parse_bare_specifier(specifier: &str) -> (String, Option<String>) {
    if specifier.starts_with('@') {
        let parts: Vec<&str> = specifier.splitn(3, '/').collect();
        if parts.len() >= 2 {
            let package_name = format!("{}/{}", parts[0], parts[1]);
            let subpath = parts.get(2).map(|s| (*s).to_string());
            return (package_name, subpath);
        }
    }

    match specifier.split_once('/') {
        Some((name, subpath)) => (name.to_string(), Some(subpath.to_string())),
        None => (specifier.to_string(), None),
    }
}

/// Resolve the exports field of package.json for `subpath` (`.` or `./x`).
fn resolve_exports(
    exports: &serde_json::Value,
    subpath: &str,
    conditions: &[&str],
) -> Option<String> {
    match exports {
        serde_json::Value::String(s) if subpath == "." => Some(s.clone()),
        serde_json::Value::Array(_) if subpath == "." => resolve_export_value(exports, conditions),
        serde_json::Value::Object(map) => {
            let is_subpath_map = map.keys().any(|key| key.starts_with('.'));
            if is_subpath_map {
                map.get(subpath)
                    .and_then(|value| resolve_export_value(value, conditions))
            } else if subpath == "." {
                resolve_export_value(exports, conditions)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Resolve one export target; condition objects are walked in key order.
fn resolve_export_value(value: &serde_json::Value, conditions: &[&str]) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Array(items) => items
            .iter()
            .find_map(|item| resolve_export_value(item, conditions)),
        serde_json::Value::Object(map) => map
            .iter()
            .filter(|(condition, _)| conditions.contains(&condition.as_str()))
            .find_map(|(_, target)| resolve_export_value(target, conditions)),
        _ => None,
    }
}

/// Source handed to the CommonJS `require` implementation.
#[derive(Debug, Serialize)]
pub struct RequireSource {
    pub format: ModuleFormat,
    pub source: String,
}

/// kiln's module loader: host first, Node resolution second.
#[derive(Clone)]
pub struct KilnModuleLoader {
    host: Arc<dyn ModuleHost>,
    resolver: NodeResolver,
    cwd: PathBuf,
}

impl KilnModuleLoader {
    pub fn new(cwd: PathBuf, host: Arc<dyn ModuleHost>) -> Self {
        Self {
            host,
            resolver: NodeResolver::new(cwd.clone()),
            cwd,
        }
    }

    /// Resolve for either `import` or `require`, returning a path or `node:<name>`.
    fn resolve_path(
        &self,
        specifier: &str,
        referrer_dir: &Path,
        mode: ResolutionMode,
    ) -> Result<PathBuf, AnyError> {
        let candidate = if specifier.starts_with("./") || specifier.starts_with("../") {
            normalize_path(&referrer_dir.join(specifier))
                .to_string_lossy()
                .into_owned()
        } else {
            specifier.to_string()
        };
        if let Some(path) = self.host.resolve(&candidate) {
            return Ok(path);
        }
        self.resolver.resolve(specifier, referrer_dir, mode)
    }

    /// `require.resolve` semantics for the CommonJS bridge.
    pub fn require_resolve(&self, specifier: &str, referrer: &str) -> Result<String, AnyError> {
        if let Some(name) = builtin_name(specifier) {
            return Ok(format!("node:{name}"));
        }
        let referrer_dir = Path::new(referrer)
            .parent()
            .map_or_else(|| self.cwd.clone(), Path::to_path_buf);
        let path = self.resolve_path(specifier, &referrer_dir, ResolutionMode::Require)?;
        Ok(path.to_string_lossy().into_owned())
    }

    /// Read a file for `require`.
    pub fn require_source(&self, path: &str) -> Result<RequireSource, AnyError> {
        let path = Path::new(path);
        let source = std::fs::read_to_string(path)?;
        let format = module_format(path, &source);
        Ok(RequireSource { format, source })
    }

    /// Load and optionally compile a module.
    fn load_module(&self, path: &Path, specifier: &ModuleSpecifier) -> Result<String, AnyError> {
        let source = std::fs::read_to_string(path)?;

        if has_source_extension(path) {
            let compiled = self.host.compile(path, &source)?;
            tracing::trace!(path = %path.display(), directive = ?compiled.directive, "compiled module");
            return Ok(match compiled.directive {
                Directive::UseClient => client_reference_module(path, &compiled.exports),
                Directive::UseServer => {
                    server_reference_module(&compiled.code, specifier, path, &compiled.exports)
                }
                Directive::None => compiled.code,
            });
        }

        match module_format(path, &source) {
            ModuleFormat::Json => Ok(format!("export default {};\n", source.trim())),
            ModuleFormat::Module => Ok(source),
            ModuleFormat::CommonJs => {
                let exports = self.scan_cjs_exports(path, &source, &mut BTreeSet::new());
                Ok(commonjs_facade(path, &exports))
            }
        }
    }

    /// Scan CommonJS source for exported names, following
    /// `module.exports = require("...")` re-exports.
    fn scan_cjs_exports(
        &self,
        path: &Path,
        source: &str,
        visited: &mut BTreeSet<PathBuf>,
    ) -> BTreeSet<String> {
        let mut exports = BTreeSet::new();
        if !visited.insert(path.to_path_buf()) {
            return exports;
        }
        let Some(patterns) = cjs_patterns() else {
            return exports;
        };

        for cap in patterns.define_property.captures_iter(source) {
            exports.insert(cap[1].to_string());
        }
        for cap in patterns.exports_dot.captures_iter(source) {
            exports.insert(cap[1].to_string());
        }
        for cap in patterns.module_exports_object.captures_iter(source) {
            for prop in patterns.object_key.captures_iter(&cap[1]) {
                exports.insert(prop[1].to_string());
            }
        }

        let dir = path.parent().unwrap_or(Path::new("/"));
        for cap in patterns.reexport.captures_iter(source) {
            let Ok(target) = self.resolver.resolve(&cap[1], dir, ResolutionMode::Require) else {
                continue;
            };
            if let Ok(target_source) = std::fs::read_to_string(&target) {
                exports.extend(self.scan_cjs_exports(&target, &target_source, visited));
            }
        }

        exports
    }
}

struct CjsPatterns {
    define_property: Regex,
    exports_dot: Regex,
    module_exports_object: Regex,
    object_key: Regex,
    reexport: Regex,
}

fn cjs_patterns() -> Option<&'static CjsPatterns> {
    static PATTERNS: OnceLock<Option<CjsPatterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            Some(CjsPatterns {
                define_property: Regex::new(
                    r#"Object\.defineProperty\s*\(\s*exports\s*,\s*["'](\w+)["']"#,
                )
                .ok()?,
                exports_dot: Regex::new(r"(?:^|[^.\w]|module\.)exports\.(\w+)\s*=").ok()?,
                module_exports_object: Regex::new(r"module\.exports\s*=\s*\{([^}]+)\}").ok()?,
                object_key: Regex::new(r"(\w+)\s*[,:]").ok()?,
                reexport: Regex::new(r#"module\.exports\s*=\s*require\(\s*["']([^"']+)["']\s*\)"#)
                    .ok()?,
            })
        })
        .as_ref()
}

/// JavaScript reserved keywords that cannot be used as export names
const RESERVED_KEYWORDS: &[&str] = &[
    "break", "case", "catch", "continue", "debugger", "default", "delete", "do", "else",
    "export", "extends", "finally", "for", "function", "if", "import", "in", "instanceof",
    "new", "return", "super", "switch", "this", "throw", "try", "typeof", "var", "void",
    "while", "with", "yield", "class", "const", "enum", "let", "static", "implements",
    "interface", "package", "private", "protected", "public", "await", "null", "true",
    "false", "undefined", "__esModule",
];

fn exportable(name: &str) -> bool {
    !RESERVED_KEYWORDS.contains(&name) && !name.starts_with(|c: char| c.is_ascii_digit())
}

fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

fn reference_id(path: &Path) -> String {
    format!("file://{}", path.display())
}

/// ESM view of a CommonJS module, backed by the shared `require` cache so
/// `import` and `require` observe the same instance.
fn commonjs_facade(path: &Path, exports: &BTreeSet<String>) -> String {
    let mut code = format!(
        "const __kiln_cjs = globalThis.__kiln.requireFile({});\nexport default __kiln_cjs;\n",
        js_string(&path.to_string_lossy())
    );
    for name in exports.iter().filter(|name| exportable(name)) {
        code.push_str(&format!("export const {name} = __kiln_cjs.{name};\n"));
    }
    code
}

/// Replace a `"use client"` module with renderer client references.
fn client_reference_module(path: &Path, exports: &[String]) -> String {
    let mut code = format!(
        r#"const {{ registerClientReference }} = globalThis.__kiln.renderer();
const __kiln_client = (name) => registerClientReference(function () {{
  throw new Error(`Attempted to call ${{name}}() from the server but ${{name}} is on the client.`);
}}, {}, name);
"#,
        js_string(&reference_id(path))
    );
    for name in exports {
        if name == "default" {
            code.push_str("export default __kiln_client(\"default\");\n");
        } else if exportable(name) {
            code.push_str(&format!("export const {name} = __kiln_client({});\n", js_string(name)));
        }
    }
    code
}

/// Keep a `"use server"` module and register its exported functions.
fn server_reference_module(
    compiled: &str,
    specifier: &ModuleSpecifier,
    path: &Path,
    exports: &[String],
) -> String {
    let names = serde_json::Value::from(exports.to_vec()).to_string();
    format!(
        r#"{compiled}
import * as __kiln_self from {self_url};
{{
  const {{ registerServerReference }} = globalThis.__kiln.renderer();
  for (const name of {names}) {{
    const value = __kiln_self[name];
    if (typeof value === "function") registerServerReference(value, {id}, name);
  }}
}}
"#,
        self_url = js_string(specifier.as_str()),
        id = js_string(&reference_id(path)),
    )
}

/// Generate synthetic module code for built-in modules.
fn builtin_module(name: &str) -> Result<String, AnyError> {
    let (name, exports) = BUILTIN_MODULES
        .iter()
        .find(|(builtin, _)| *builtin == name)
        .ok_or_else(|| AnyError::msg(format!("Built-in module '{name}' is not implemented")))?;
    Ok(format!(
        "const mod = globalThis.__kiln.builtins[{}];\nexport default mod;\nexport const {{ {exports} }} = mod;\n",
        js_string(name)
    ))
}

impl ModuleLoader for KilnModuleLoader {
    fn resolve(
        &self,
        specifier: &str,
        referrer: &str,
        _kind: ResolutionKind,
    ) -> Result<ModuleSpecifier, AnyError> {
        if let Some(name) = builtin_name(specifier) {
            return ModuleSpecifier::parse(&format!("{BUILTIN_SCHEME}:///{name}"))
                .map_err(|e| AnyError::msg(format!("Invalid builtin module: {e}")));
        }

        let referrer_dir = ModuleSpecifier::parse(referrer)
            .ok()
            .and_then(|url| url.to_file_path().ok())
            .and_then(|path| path.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| self.cwd.clone());

        let resolved_path = self.resolve_path(specifier, &referrer_dir, ResolutionMode::Import)?;

        ModuleSpecifier::from_file_path(&resolved_path)
            .map_err(|()| AnyError::msg(format!("Invalid path: {}", resolved_path.display())))
    }

    fn load(
        &self,
        module_specifier: &ModuleSpecifier,
        _maybe_referrer: Option<&ModuleSpecifier>,
        _is_dyn_import: bool,
        _requested_module_type: RequestedModuleType,
    ) -> ModuleLoadResponse {
        let specifier = module_specifier.clone();
        let loader = self.clone();

        ModuleLoadResponse::Async(
            async move {
                let code = if specifier.scheme() == BUILTIN_SCHEME {
                    builtin_module(specifier.path().trim_start_matches('/'))?
                } else {
                    let path = specifier.to_file_path().map_err(|()| {
                        AnyError::msg(format!("Invalid module specifier: {specifier}"))
                    })?;
                    loader.load_module(&path, &specifier)?
                };

                Ok(ModuleSource::new(
                    ModuleType::JavaScript,
                    ModuleSourceCode::String(code.into()),
                    &specifier,
                    None,
                ))
            }
            .boxed_local(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::DevModuleHost;
    use std::fs;
    use tempfile::TempDir;

    fn loader_for(temp: &TempDir) -> KilnModuleLoader {
        KilnModuleLoader::new(
            temp.path().to_path_buf(),
            Arc::new(DevModuleHost::new(temp.path())),
        )
    }

    fn setup_node_modules(temp: &TempDir) {
        let simple_pkg = temp.path().join("node_modules/simple-pkg");
        fs::create_dir_all(&simple_pkg).unwrap();
        fs::write(simple_pkg.join("index.js"), "export const x = 1;").unwrap();
        fs::write(simple_pkg.join("package.json"), r#"{"name": "simple-pkg"}"#).unwrap();

        let with_main = temp.path().join("node_modules/with-main");
        fs::create_dir_all(&with_main).unwrap();
        fs::write(with_main.join("lib.js"), "exports.y = 2;").unwrap();
        fs::write(
            with_main.join("package.json"),
            r#"{"name": "with-main", "main": "lib.js"}"#,
        )
        .unwrap();

        // Mirrors how React publishes server builds.
        let conditional = temp.path().join("node_modules/conditional");
        fs::create_dir_all(&conditional).unwrap();
        fs::write(conditional.join("index.js"), "module.exports = 'client';").unwrap();
        fs::write(conditional.join("server.js"), "module.exports = 'server';").unwrap();
        fs::write(conditional.join("sub.node.js"), "").unwrap();
        fs::write(conditional.join("sub.js"), "").unwrap();
        fs::write(
            conditional.join("package.json"),
            r#"{
            "name": "conditional",
            "exports": {
                ".": {
                    "react-server": "./server.js",
                    "default": "./index.js"
                },
                "./sub": {
                    "browser": "./sub.js",
                    "node": "./sub.node.js"
                },
                "./package.json": "./package.json"
            }
        }"#,
        )
        .unwrap();

        let scoped = temp.path().join("node_modules/@scope/pkg");
        fs::create_dir_all(&scoped).unwrap();
        fs::write(scoped.join("index.js"), "export const scoped = true;").unwrap();
        fs::write(scoped.join("package.json"), r#"{"name": "@scope/pkg"}"#).unwrap();
    }

    fn resolve(loader: &KilnModuleLoader, temp: &TempDir, specifier: &str) -> PathBuf {
        let referrer = ModuleSpecifier::from_file_path(temp.path().join("entry.js")).unwrap();
        loader
            .resolve(specifier, referrer.as_str(), ResolutionKind::Import)
            .unwrap()
            .to_file_path()
            .unwrap()
    }

    #[test]
    fn test_parse_bare_specifier() {
        assert_eq!(parse_bare_specifier("react"), ("react".to_string(), None));
        assert_eq!(
            parse_bare_specifier("react-dom/server"),
            ("react-dom".to_string(), Some("server".to_string()))
        );
        assert_eq!(parse_bare_specifier("@scope/pkg"), ("@scope/pkg".to_string(), None));
        assert_eq!(
            parse_bare_specifier("@scope/pkg/utils"),
            ("@scope/pkg".to_string(), Some("utils".to_string()))
        );
    }

    #[test]
    fn test_host_resolves_extensionless_project_files() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("lib")).unwrap();
        fs::write(temp.path().join("lib/db.ts"), "export const db = 1;").unwrap();
        let loader = loader_for(&temp);

        assert_eq!(resolve(&loader, &temp, "./lib/db"), temp.path().join("lib/db.ts"));
        assert_eq!(resolve(&loader, &temp, "lib/db"), temp.path().join("lib/db.ts"));
    }

    #[test]
    fn test_node_modules_fallback() {
        let temp = TempDir::new().unwrap();
        setup_node_modules(&temp);
        let loader = loader_for(&temp);

        assert!(resolve(&loader, &temp, "simple-pkg").ends_with("simple-pkg/index.js"));
        assert!(resolve(&loader, &temp, "with-main").ends_with("with-main/lib.js"));
        assert!(resolve(&loader, &temp, "@scope/pkg").ends_with("@scope/pkg/index.js"));
    }

    #[test]
    fn test_exports_conditions_in_declaration_order() {
        let temp = TempDir::new().unwrap();
        setup_node_modules(&temp);
        let loader = loader_for(&temp);

        assert!(resolve(&loader, &temp, "conditional").ends_with("conditional/server.js"));
        assert!(resolve(&loader, &temp, "conditional/sub").ends_with("conditional/sub.node.js"));
    }

    #[test]
    fn test_unexported_subpath_rejected() {
        let temp = TempDir::new().unwrap();
        setup_node_modules(&temp);
        let loader = loader_for(&temp);
        let referrer = ModuleSpecifier::from_file_path(temp.path().join("entry.js")).unwrap();

        let err = loader
            .resolve("conditional/hidden", referrer.as_str(), ResolutionKind::Import)
            .unwrap_err();
        assert!(err.to_string().contains("not exported"));
    }

    #[test]
    fn test_builtins_use_synthetic_scheme() {
        let temp = TempDir::new().unwrap();
        let loader = loader_for(&temp);
        let resolved = loader
            .resolve("node:async_hooks", "file:///x/entry.js", ResolutionKind::Import)
            .unwrap();
        assert_eq!(resolved.as_str(), "kiln-builtin:///async_hooks");
        assert_eq!(builtin_name("util"), Some("util"));
        assert_eq!(builtin_name("node:fs"), None);
    }

    #[test]
    fn test_missing_package_error() {
        let temp = TempDir::new().unwrap();
        let loader = loader_for(&temp);
        let referrer = ModuleSpecifier::from_file_path(temp.path().join("entry.js")).unwrap();
        let err = loader
            .resolve("nonexistent-pkg", referrer.as_str(), ResolutionKind::Import)
            .unwrap_err();
        assert!(err.to_string().contains("Cannot find package"));
    }

    #[test]
    fn test_require_resolve() {
        let temp = TempDir::new().unwrap();
        setup_node_modules(&temp);
        let loader = loader_for(&temp);
        let referrer = temp.path().join("entry.js");
        let referrer = referrer.to_string_lossy();

        assert_eq!(loader.require_resolve("node:util", &referrer).unwrap(), "node:util");
        assert!(loader
            .require_resolve("with-main", &referrer)
            .unwrap()
            .ends_with("with-main/lib.js"));
    }

    #[test]
    fn test_module_format_detection() {
        let temp = TempDir::new().unwrap();
        let esm_pkg = temp.path().join("esm");
        fs::create_dir(&esm_pkg).unwrap();
        fs::write(esm_pkg.join("package.json"), r#"{"type": "module"}"#).unwrap();

        assert_eq!(
            module_format(&temp.path().join("a.js"), "exports.a = 1;"),
            ModuleFormat::CommonJs
        );
        assert_eq!(
            module_format(&temp.path().join("b.js"), "import x from 'y';\nexport default x;"),
            ModuleFormat::Module
        );
        assert_eq!(
            module_format(&esm_pkg.join("c.js"), "const c = 1;"),
            ModuleFormat::Module
        );
        assert_eq!(module_format(&temp.path().join("d.json"), "{}"), ModuleFormat::Json);
        assert_eq!(module_format(&temp.path().join("e.cjs"), ""), ModuleFormat::CommonJs);
    }

    #[test]
    fn test_commonjs_exports_follow_reexports() {
        let temp = TempDir::new().unwrap();
        let pkg = temp.path().join("node_modules/react-like");
        fs::create_dir_all(pkg.join("cjs")).unwrap();
        fs::write(
            pkg.join("index.js"),
            "if (process.env.NODE_ENV === 'production') {\n  module.exports = require('./cjs/prod.js');\n} else {\n  module.exports = require('./cjs/dev.js');\n}\n",
        )
        .unwrap();
        fs::write(pkg.join("cjs/dev.js"), "exports.useState = function () {};\nexports.default = 1;\nexports.Children = {};\n").unwrap();
        fs::write(pkg.join("cjs/prod.js"), "exports.useState = function () {};\nexports.cache = function () {};\n").unwrap();

        let loader = loader_for(&temp);
        let index = pkg.join("index.js");
        let source = fs::read_to_string(&index).unwrap();
        let exports = loader.scan_cjs_exports(&index, &source, &mut BTreeSet::new());
        let names: Vec<&str> = exports.iter().map(String::as_str).collect();
        assert_eq!(names, vec!["Children", "cache", "default", "useState"]);

        let facade = commonjs_facade(&index, &exports);
        assert!(facade.contains("globalThis.__kiln.requireFile("));
        assert!(facade.contains("export const useState = __kiln_cjs.useState;"));
        assert!(!facade.contains("export const default"));
    }

    #[test]
    fn test_use_client_module_becomes_references() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("Counter.tsx");
        fs::write(
            &file,
            "\"use client\";\nexport function Counter() { return <button />; }\nexport default Counter;\n",
        )
        .unwrap();

        let loader = loader_for(&temp);
        let specifier = ModuleSpecifier::from_file_path(&file).unwrap();
        let code = loader.load_module(&file, &specifier).unwrap();

        assert!(code.contains("registerClientReference"));
        assert!(code.contains(&format!("\"file://{}\"", file.display())));
        assert!(code.contains("export const Counter = __kiln_client(\"Counter\");"));
        assert!(code.contains("export default __kiln_client(\"default\");"));
        assert!(!code.contains("<button"));
    }

    #[test]
    fn test_use_server_module_registers_functions() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("actions.ts");
        fs::write(
            &file,
            "\"use server\";\nexport async function save(v: string) { return v; }\n",
        )
        .unwrap();

        let loader = loader_for(&temp);
        let specifier = ModuleSpecifier::from_file_path(&file).unwrap();
        let code = loader.load_module(&file, &specifier).unwrap();

        assert!(code.starts_with("\"use server\";"));
        assert!(code.contains("async function save"));
        assert!(code.contains(&format!("import * as __kiln_self from \"{specifier}\";")));
        assert!(code.contains("registerServerReference(value"));
        assert!(code.contains("[\"save\"]"));
    }

    #[test]
    fn test_builtin_module_code() {
        let code = builtin_module("async_hooks").unwrap();
        assert!(code.contains("globalThis.__kiln.builtins[\"async_hooks\"]"));
        assert!(code.contains("AsyncLocalStorage"));
        assert!(builtin_module("fs").is_err());
    }
}
