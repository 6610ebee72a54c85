//! Surfaces, workspaces, views and personas

use serde::{Deserialize, Serialize};

use super::{Reference, References, SpannedExpr};
use crate::parser::tokenizer::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceMode {
    #[default]
    List,
    View,
    Create,
    Edit,
    Custom,
}

impl SurfaceMode {
    pub fn parse(word: &str) -> Option<SurfaceMode> {
        match word {
            "list" => Some(SurfaceMode::List),
            "view" => Some(SurfaceMode::View),
            "create" => Some(SurfaceMode::Create),
            "edit" => Some(SurfaceMode::Edit),
            "custom" => Some(SurfaceMode::Custom),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SurfaceField {
    pub name: String,
    pub label: Option<String>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Section {
    pub name: String,
    pub title: Option<String>,
    pub fields: Vec<SurfaceField>,
    pub span: Span,
}

/// `action view_detail "View": -> surface invoice_detail`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SurfaceAction {
    pub name: String,
    pub label: Option<String>,
    pub target: Reference,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttentionLevel {
    Critical,
    Warning,
    Notice,
    Info,
}

impl AttentionLevel {
    pub fn parse(word: &str) -> Option<AttentionLevel> {
        match word {
            "critical" => Some(AttentionLevel::Critical),
            "warning" => Some(AttentionLevel::Warning),
            "notice" => Some(AttentionLevel::Notice),
            "info" => Some(AttentionLevel::Info),
            _ => None,
        }
    }
}

/// A condition that should draw the user's attention to a row
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Attention {
    pub level: AttentionLevel,
    pub condition: SpannedExpr,
    pub message: String,
    pub action: Option<Reference>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct UxSpec {
    pub purpose: Option<String>,
    pub sort: Vec<SortKey>,
    pub filter: Vec<String>,
    pub search: Vec<String>,
    pub empty: Option<String>,
    pub attention: Vec<Attention>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SurfaceSpec {
    pub name: String,
    pub title: Option<String>,
    pub entity: Option<Reference>,
    pub mode: SurfaceMode,
    pub sections: Vec<Section>,
    pub actions: Vec<SurfaceAction>,
    pub ux: Option<UxSpec>,
    pub span: Span,
}

impl SurfaceSpec {
    /// Every field shown in any section
    pub fn fields(&self) -> impl Iterator<Item = &SurfaceField> {
        self.sections.iter().flat_map(|s| s.fields.iter())
    }
}

impl References for SurfaceSpec {
    fn for_each_ref(&mut self, visit: &mut dyn FnMut(&mut Reference)) {
        self.entity.for_each_ref(visit);
        for action in &mut self.actions {
            visit(&mut action.target);
        }
        if let Some(ux) = &mut self.ux {
            for attention in &mut ux.attention {
                attention.action.for_each_ref(visit);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    #[default]
    List,
    Grid,
    Timeline,
    Map,
    Kanban,
    Metrics,
    Detail,
}

impl DisplayMode {
    pub fn parse(word: &str) -> Option<DisplayMode> {
        match word {
            "list" => Some(DisplayMode::List),
            "grid" => Some(DisplayMode::Grid),
            "timeline" => Some(DisplayMode::Timeline),
            "map" => Some(DisplayMode::Map),
            "kanban" => Some(DisplayMode::Kanban),
            "metrics" => Some(DisplayMode::Metrics),
            "detail" => Some(DisplayMode::Detail),
            _ => None,
        }
    }
}

/// One region of a workspace
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    pub name: String,
    pub title: Option<String>,
    pub source: Reference,
    pub filter: Option<SpannedExpr>,
    pub sort: Vec<SortKey>,
    pub limit: Option<u32>,
    pub display: DisplayMode,
    pub action: Option<Reference>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkspaceSpec {
    pub name: String,
    pub title: Option<String>,
    pub purpose: Option<String>,
    pub regions: Vec<Region>,
    pub span: Span,
}

impl References for WorkspaceSpec {
    fn for_each_ref(&mut self, visit: &mut dyn FnMut(&mut Reference)) {
        for region in &mut self.regions {
            visit(&mut region.source);
            region.action.for_each_ref(visit);
        }
    }
}

/// A read-only projection over one entity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ViewSpec {
    pub name: String,
    pub title: Option<String>,
    pub source: Reference,
    pub filter: Option<SpannedExpr>,
    pub fields: Vec<String>,
    pub span: Span,
}

impl References for ViewSpec {
    fn for_each_ref(&mut self, visit: &mut dyn FnMut(&mut Reference)) {
        visit(&mut self.source);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PersonaSpec {
    pub name: String,
    pub title: Option<String>,
    pub goals: Vec<String>,
    pub proficiency: Option<String>,
    pub default_workspace: Option<Reference>,
    pub span: Span,
}

impl References for PersonaSpec {
    fn for_each_ref(&mut self, visit: &mut dyn FnMut(&mut Reference)) {
        self.default_workspace.for_each_ref(visit);
    }
}
