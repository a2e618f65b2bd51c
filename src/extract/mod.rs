//! Declaration & dependency extraction
//!
//! Each file is parsed with tree-sitter, its import block is classified
//! against the module path, and the resulting [`ResolutionContext`] drives
//! extraction of symbols and their intra-module call dependencies.

pub mod context;
pub mod go;

pub use context::{ClassifiedImport, ImportSpec, ImportTarget, ImportType, ResolutionContext, default_alias};
pub use go::{GoFile, GoParser};

use crate::Result;
use crate::collect::SourceFile;
use crate::module::ModuleInfo;
use crate::symbol::Symbol;

/// Everything the index stores for one file, minus the row ids.
#[derive(Debug, Default)]
pub struct ExtractedFile {
    /// Name from the `package` clause
    pub package_name: String,
    /// Imports de-duplicated by path, first occurrence wins
    pub imports: Vec<ClassifiedImport>,
    pub symbols: Vec<Symbol>,
}

/// Parse one source file and extract its imports and declarations.
pub fn extract_file(parser: &mut GoParser, file: &SourceFile, module: &ModuleInfo) -> Result<ExtractedFile> {
    let parsed = parser.parse(&file.relative_path, &file.content)?;

    let classified: Vec<ClassifiedImport> = parsed
        .imports()
        .into_iter()
        .map(|spec| ClassifiedImport::classify(spec, module))
        .collect();

    // Every spec binds its alias, but only one row per import path is stored.
    let ctx = ResolutionContext::new(file.package_path(), &classified);
    let symbols = parsed.extract(&ctx);

    let mut imports: Vec<ClassifiedImport> = Vec::with_capacity(classified.len());
    for import in classified {
        if imports.iter().any(|i| i.spec.path == import.spec.path) {
            tracing::debug!(
                "{}:{}: duplicate import of {:?}",
                file.relative_path,
                import.spec.line,
                import.spec.path
            );
            continue;
        }
        imports.push(import);
    }

    Ok(ExtractedFile {
        package_name: parsed.package_name(),
        imports,
        symbols,
    })
}
