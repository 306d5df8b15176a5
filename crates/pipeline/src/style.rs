//! Stylesheet compilers.
//!
//! [`ThemeStyleCompiler`] emits a self-contained stylesheet straight from the
//! project theme. [`TailwindCompiler`] shells out to a Tailwind CLI binary
//! and scans the rendered markup for utility classes.

use std::fmt::Write as _;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use sitepress_core::project::{Project, Theme};
use tokio::process::Command;

use crate::error::PipelineError;
use crate::{RenderedSite, StyleCompiler};

/// `(custom property, value)` pairs for every theme value that is set.
fn theme_variables(theme: &Theme) -> Vec<(&'static str, &str)> {
    let sizes = &theme.typography.font_sizes;
    let spacing = &theme.spacing;
    [
        ("--color-primary", theme.colors.primary.as_str()),
        ("--color-secondary", theme.colors.secondary.as_str()),
        ("--color-background", theme.colors.background.as_str()),
        ("--color-text", theme.colors.text.as_str()),
        ("--font-family", theme.typography.font_family.as_str()),
        ("--font-size-sm", sizes.small.as_str()),
        ("--font-size-base", sizes.base.as_str()),
        ("--font-size-lg", sizes.large.as_str()),
        ("--font-size-xl", sizes.xlarge.as_str()),
        ("--font-size-2xl", sizes.xxlarge.as_str()),
        ("--spacing-sm", spacing.small.as_str()),
        ("--spacing-md", spacing.medium.as_str()),
        ("--spacing-lg", spacing.large.as_str()),
        ("--spacing-xl", spacing.xlarge.as_str()),
    ]
    .into_iter()
    .filter(|(_, value)| !value.trim().is_empty())
    .collect()
}

/// Theme custom properties plus the color utilities the templates use.
fn theme_layer(theme: &Theme) -> String {
    let mut css = String::from(":root {\n");
    for (name, value) in theme_variables(theme) {
        let _ = writeln!(css, "  {name}: {value};");
    }
    css.push_str("}\n");
    css.push_str(
        "body { font-family: var(--font-family, system-ui), sans-serif; \
         background-color: var(--color-background, #fff); color: var(--color-text, #111); }\n\
         .bg-primary { background-color: var(--color-primary); }\n\
         .text-primary { color: var(--color-primary); }\n\
         .bg-secondary { background-color: var(--color-secondary); }\n\
         .text-secondary { color: var(--color-secondary); }\n\
         .bg-background { background-color: var(--color-background); }\n\
         .text-text { color: var(--color-text); }\n",
    );
    css
}

// ---------------------------------------------------------------------------
// Theme compiler
// ---------------------------------------------------------------------------

/// Builds the stylesheet from the theme alone; no external tooling.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThemeStyleCompiler;

impl ThemeStyleCompiler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StyleCompiler for ThemeStyleCompiler {
    async fn compile(
        &self,
        project: &Project,
        _site: &RenderedSite,
    ) -> Result<Vec<u8>, PipelineError> {
        Ok(theme_layer(&project.global_config.theme).into_bytes())
    }
}

// ---------------------------------------------------------------------------
// Tailwind compiler
// ---------------------------------------------------------------------------

/// Runs a Tailwind CLI over the rendered markup in a scratch directory.
#[derive(Debug, Clone)]
pub struct TailwindCompiler {
    binary: PathBuf,
}

impl TailwindCompiler {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn input_stylesheet(theme: &Theme) -> String {
        let mut css = String::from("@tailwind base;\n@tailwind components;\n@tailwind utilities;\n\n@layer base {\n");
        css.push_str(&theme_layer(theme));
        css.push_str("}\n");
        css
    }

    fn config(theme: &Theme) -> String {
        let colors = &theme.colors;
        let sizes = &theme.typography.font_sizes;
        let spacing = &theme.spacing;
        let quote = |s: &str| format!("{s:?}");
        format!(
            "module.exports = {{\n  content: [\"./*.html\"],\n  theme: {{\n    extend: {{\n      \
             colors: {{ primary: {}, secondary: {}, background: {}, text: {} }},\n      \
             fontFamily: {{ sans: [{}, \"sans-serif\"] }},\n      \
             fontSize: {{ sm: {}, base: {}, lg: {}, xl: {}, \"2xl\": {} }},\n      \
             spacing: {{ sm: {}, md: {}, lg: {}, xl: {} }}\n    }}\n  }},\n  plugins: [],\n}};\n",
            quote(&colors.primary),
            quote(&colors.secondary),
            quote(&colors.background),
            quote(&colors.text),
            quote(&theme.typography.font_family),
            quote(&sizes.small),
            quote(&sizes.base),
            quote(&sizes.large),
            quote(&sizes.xlarge),
            quote(&sizes.xxlarge),
            quote(&spacing.small),
            quote(&spacing.medium),
            quote(&spacing.large),
            quote(&spacing.xlarge),
        )
    }
}

#[async_trait]
impl StyleCompiler for TailwindCompiler {
    async fn compile(
        &self,
        project: &Project,
        site: &RenderedSite,
    ) -> Result<Vec<u8>, PipelineError> {
        // Removed on drop, whichever way this function exits.
        let scratch = tempfile::Builder::new().prefix("css-compiler-").tempdir()?;
        let dir = scratch.path();
        let theme = &project.global_config.theme;

        tokio::fs::write(dir.join("input.html"), site.combined_html()).await?;
        tokio::fs::write(dir.join("input.css"), Self::input_stylesheet(theme)).await?;
        tokio::fs::write(dir.join("tailwind.config.js"), Self::config(theme)).await?;

        let output = Command::new(&self.binary)
            .args([
                "-i",
                "input.css",
                "-o",
                "output.css",
                "--content",
                "input.html",
                "--minify",
            ])
            .current_dir(dir)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                PipelineError::Style(format!(
                    "failed to run {}: {e}",
                    self.binary.display()
                ))
            })?;

        if !output.status.success() {
            return Err(PipelineError::Style(format!(
                "tailwind exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let css = tokio::fs::read(dir.join("output.css")).await?;
        tracing::debug!(bytes = css.len(), "Tailwind stylesheet compiled");
        Ok(css)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
