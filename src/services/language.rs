/// Editor language tag from a file name.

use std::path::Path;

pub fn detect_language(path: &Path) -> &'static str {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match name.as_str() {
        "dockerfile" => return "dockerfile",
        "makefile" => return "makefile",
        ".gitignore" | ".env" => return "ini",
        _ => {}
    }

    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "js" | "mjs" | "jsx" => "javascript",
        "ts" | "tsx" => "typescript",
        "py" | "pyw" => "python",
        "php" | "phtml" => "php",
        "html" | "htm" => "html",
        "css" => "css",
        "scss" => "scss",
        "less" => "less",
        "sass" => "sass",
        "json" | "jsonc" => "json",
        "xml" | "svg" => "xml",
        "yaml" | "yml" => "yaml",
        "md" | "markdown" => "markdown",
        "sql" => "sql",
        "sh" | "bash" | "zsh" => "shell",
        "dockerfile" => "dockerfile",
        "go" => "go",
        "rs" => "rust",
        "java" => "java",
        "c" | "h" => "c",
        "cpp" | "cc" | "cxx" | "hpp" => "cpp",
        "rb" => "ruby",
        "swift" => "swift",
        "kt" | "kts" => "kotlin",
        "lua" => "lua",
        "r" => "r",
        "pl" | "pm" => "perl",
        "ini" | "conf" | "cfg" | "toml" | "env" => "ini",
        "vue" => "vue",
        "svelte" => "svelte",
        _ => "plaintext",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions_and_special_names() {
        assert_eq!(detect_language(Path::new("src/app.js")), "javascript");
        assert_eq!(detect_language(Path::new("lib.RS")), "rust");
        assert_eq!(detect_language(Path::new("Cargo.toml")), "ini");
        assert_eq!(detect_language(Path::new("Dockerfile")), "dockerfile");
        assert_eq!(detect_language(Path::new("Makefile")), "makefile");
        assert_eq!(detect_language(Path::new(".gitignore")), "ini");
        assert_eq!(detect_language(Path::new("notes.txt")), "plaintext");
        assert_eq!(detect_language(Path::new("README")), "plaintext");
    }
}
