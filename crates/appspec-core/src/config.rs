//! Compile options
//!
//! All knobs are optional in the JSON form; missing keys take the defaults
//! below.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Options for one compilation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompileOptions {
    /// Parse independent files on the rayon thread pool
    pub parallel: bool,
    /// Treat warnings as errors when deciding whether an `AppSpec` is produced
    pub warnings_as_errors: bool,
    /// Maximum nesting depth of a single expression
    pub max_expr_depth: usize,
    /// Column width of a tab character when measuring indentation
    pub tab_width: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            parallel: true,
            warnings_as_errors: false,
            max_expr_depth: 32,
            tab_width: 4,
        }
    }
}

impl CompileOptions {
    /// Load options from a JSON document
    pub fn from_json(text: &str) -> Result<Self> {
        let options: CompileOptions =
            serde_json::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    fn validate(&self) -> Result<()> {
        if self.max_expr_depth == 0 {
            return Err(Error::Config("max_expr_depth must be at least 1".into()));
        }
        if self.tab_width == 0 {
            return Err(Error::Config("tab_width must be at least 1".into()));
        }
        Ok(())
    }
}
