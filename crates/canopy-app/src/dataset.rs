use crate::NodeProvider;
use anyhow::{Context, Result, bail};
use canopy_api::{
    ChildNodeDto, ChildNodeRequest, ChildNodeResponse, NodeId as ApiNodeId, NodePathRequest,
    NodePathResponse, RootNodeResponse,
};
use canopy_core::{ChildPage, NodeId, NodePath, PathStep, ProviderError};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

const REQUIRED_COLUMNS: [&str; 4] = ["parent_item", "child_item", "sequence_no", "level"];
const SEPARATORS: [char; 4] = [',', ';', '\t', '|'];

/// One parent/child row of a relationship dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub parent_item: String,
    pub child_item: String,
    pub sequence_no: u32,
    pub level: u32,
}

fn normalize_column(raw: &str) -> String {
    raw.replace('\u{feff}', "").trim().to_lowercase()
}

fn sniff_separator(header: &str) -> char {
    SEPARATORS
        .iter()
        .copied()
        .max_by_key(|sep| header.matches(*sep).count())
        .filter(|sep| header.contains(*sep))
        .unwrap_or(',')
}

/// A parsed CSV record and the line it starts on.
struct Record {
    line: usize,
    fields: Vec<String>,
}

/// Split CSV text into records, honouring double-quoted fields, `""`
/// escapes and line breaks inside quotes. Blank lines are dropped.
fn split_records(text: &str, sep: char) -> Vec<Record> {
    let mut records = Vec::new();
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut line = 1;
    let mut record_line = 1;
    let mut chars = text.chars().peekable();

    let mut finish = |fields: &mut Vec<String>, current: &mut String, start: usize| {
        fields.push(std::mem::take(current));
        let blank = fields.len() == 1 && fields[0].trim().is_empty();
        let fields = std::mem::take(fields);
        if !blank {
            records.push(Record {
                line: start,
                fields,
            });
        }
    };

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            '\n' => {
                line += 1;
                if in_quotes {
                    current.push('\n');
                } else {
                    finish(&mut fields, &mut current, record_line);
                    record_line = line;
                }
            }
            '\r' if !in_quotes => {}
            c if c == sep && !in_quotes => fields.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    finish(&mut fields, &mut current, record_line);
    records
}

fn parse_integer(raw: &str) -> Option<u32> {
    raw.parse::<u32>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|v| v.fract() == 0.0 && *v >= 0.0 && *v <= f64::from(u32::MAX))
            .map(|v| v as u32)
    })
}

/// Parse relationship rows from CSV text with a header row.
pub fn parse_csv_text(text: &str) -> Result<Vec<Relationship>> {
    let header_line = text
        .lines()
        .find(|line| !line.trim().is_empty())
        .unwrap_or_default();
    let sep = sniff_separator(header_line);
    let mut records = split_records(text, sep).into_iter();

    let Some(header) = records.next() else {
        bail!("CSV is empty");
    };
    let columns: Vec<String> = header.fields.iter().map(|c| normalize_column(c)).collect();

    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|required| !columns.iter().any(|c| c == required))
        .collect();
    if !missing.is_empty() {
        bail!(
            "Missing required columns: {:?}. Found: {:?}",
            missing,
            columns
        );
    }
    let column = |name: &str| columns.iter().position(|c| c == name).unwrap_or_default();
    let (parent_col, child_col, seq_col, level_col) = (
        column("parent_item"),
        column("child_item"),
        column("sequence_no"),
        column("level"),
    );

    let mut rows = Vec::new();
    for record in records {
        let field = |idx: usize| record.fields.get(idx).map(|f| f.trim()).unwrap_or("");
        let line_no = record.line;

        let parent_item = field(parent_col);
        let child_item = field(child_col);
        if parent_item.is_empty() || child_item.is_empty() {
            bail!("line {line_no}: parent_item and child_item must not be empty");
        }
        let sequence_no = parse_integer(field(seq_col))
            .with_context(|| format!("line {line_no}: invalid sequence_no {:?}", field(seq_col)))?;
        let level = parse_integer(field(level_col))
            .with_context(|| format!("line {line_no}: invalid level {:?}", field(level_col)))?;

        rows.push(Relationship {
            parent_item: parent_item.to_string(),
            child_item: child_item.to_string(),
            sequence_no,
            level,
        });
    }
    Ok(rows)
}

/// In-memory relationship dataset that answers child and path queries the
/// way the remote node service does.
#[derive(Debug, Clone, Default)]
pub struct RelationshipStore {
    children: HashMap<String, Vec<Relationship>>,
    parents: HashMap<String, String>,
    roots: Vec<String>,
    row_count: usize,
}

impl RelationshipStore {
    pub fn new(rows: Vec<Relationship>) -> Self {
        let row_count = rows.len();
        let mut children: HashMap<String, Vec<Relationship>> = HashMap::new();
        let mut parents: HashMap<String, String> = HashMap::new();

        for row in rows {
            // First parent wins for path resolution.
            parents
                .entry(row.child_item.clone())
                .or_insert_with(|| row.parent_item.clone());
            children.entry(row.parent_item.clone()).or_default().push(row);
        }
        for rows in children.values_mut() {
            rows.sort_by_key(|row| row.sequence_no);
        }

        let mut roots: Vec<String> = children
            .keys()
            .filter(|parent| !parents.contains_key(*parent))
            .cloned()
            .collect();
        roots.sort();

        tracing::debug!(
            "Loaded {} relationships ({} parents, {} roots)",
            row_count,
            children.len(),
            roots.len()
        );
        Self {
            children,
            parents,
            roots,
            row_count,
        }
    }

    pub fn from_csv_text(text: &str) -> Result<Self> {
        Ok(Self::new(parse_csv_text(text)?))
    }

    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let raw = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let text = String::from_utf8_lossy(&raw);
        Self::from_csv_text(&text).with_context(|| format!("Failed to import {}", path.display()))
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn roots(&self) -> &[String] {
        &self.roots
    }

    pub fn contains(&self, id: &str) -> bool {
        self.children.contains_key(id) || self.parents.contains_key(id)
    }

    fn child_count(&self, id: &str) -> u32 {
        self.children
            .get(id)
            .map_or(0, |rows| u32::try_from(rows.len()).unwrap_or(u32::MAX))
    }

    fn child_dto(&self, row: &Relationship) -> ChildNodeDto {
        let count = self.child_count(&row.child_item);
        ChildNodeDto {
            id: ApiNodeId(row.child_item.clone()),
            name: row.child_item.clone(),
            sequence_no: row.sequence_no,
            level: row.level,
            has_children: count > 0,
            child_count: Some(count),
        }
    }

    pub fn root_nodes(&self) -> RootNodeResponse {
        let message = if self.roots.is_empty() {
            "no roots found"
        } else {
            "roots"
        };
        RootNodeResponse {
            root_nodes: self.roots.iter().map(|r| ApiNodeId(r.clone())).collect(),
            message: message.to_string(),
            count: u32::try_from(self.roots.len()).unwrap_or(u32::MAX),
        }
    }

    /// Children of `id` ordered by `sequence_no`, truncated to `limit`.
    pub fn child_nodes(&self, req: &ChildNodeRequest) -> Option<ChildNodeResponse> {
        let (id, limit) = (req.node_id.0.as_str(), req.limit);
        if !self.contains(id) {
            return None;
        }
        let rows = self.children.get(id).map(Vec::as_slice).unwrap_or_default();
        let take = limit.map_or(rows.len(), |l| rows.len().min(l as usize));
        let parent = self.parents.get(id).and_then(|parent_id| {
            self.children
                .get(parent_id)?
                .iter()
                .find(|row| row.child_item == id)
                .map(|row| ChildNodeDto {
                    id: ApiNodeId(parent_id.clone()),
                    name: parent_id.clone(),
                    sequence_no: row.sequence_no,
                    level: row.level,
                    has_children: true,
                    child_count: Some(self.child_count(parent_id)),
                })
        });

        Some(ChildNodeResponse {
            search_id: ApiNodeId(id.to_string()),
            parent,
            children: rows[..take].iter().map(|row| self.child_dto(row)).collect(),
            count_children: self.child_count(id),
        })
    }

    /// Walk from `from` down to `to`, ending with a terminal step.
    pub fn node_path(&self, req: &NodePathRequest) -> Option<NodePathResponse> {
        let (from, to) = (req.from_id.0.as_str(), req.to_id.0.as_str());
        if !self.contains(to) || !self.contains(from) {
            return None;
        }

        let mut chain = vec![to.to_string()];
        let mut seen: HashSet<&str> = HashSet::new();
        let mut current = to;
        while current != from {
            if !seen.insert(current) {
                tracing::warn!("Cycle in parent links while resolving path to {}", to);
                return None;
            }
            current = self.parents.get(current).map(String::as_str)?;
            chain.push(current.to_string());
        }
        chain.reverse();

        let mut steps: Vec<PathStep> = chain
            .windows(2)
            .map(|pair| PathStep::new(pair[0].as_str(), pair[1].as_str(), pair[1].as_str()))
            .collect();
        steps.push(PathStep::terminal(to));
        Some(NodePathResponse::from(&NodePath { steps }))
    }
}

impl NodeProvider for RelationshipStore {
    fn list_roots(&self) -> Result<Vec<NodeId>, ProviderError> {
        Ok(self
            .root_nodes()
            .root_nodes
            .into_iter()
            .map(|id| NodeId::new(id.0))
            .collect())
    }

    fn fetch_children(
        &self,
        node_id: &NodeId,
        page_limit: Option<u32>,
    ) -> Result<ChildPage, ProviderError> {
        let req = ChildNodeRequest {
            node_id: ApiNodeId::from(node_id),
            limit: page_limit,
        };
        self.child_nodes(&req)
            .map(ChildPage::from)
            .ok_or_else(|| ProviderError::NotFound(node_id.clone()))
    }

    fn child_total(&self, node_id: &NodeId) -> Result<u32, ProviderError> {
        if !self.contains(node_id.as_str()) {
            return Err(ProviderError::NotFound(node_id.clone()));
        }
        Ok(self.child_count(node_id.as_str()))
    }

    fn fetch_path(&self, from: &NodeId, to: &NodeId) -> Result<NodePath, ProviderError> {
        let req = NodePathRequest {
            from_id: ApiNodeId::from(from),
            to_id: ApiNodeId::from(to),
        };
        self.node_path(&req)
            .map(NodePath::from)
            .ok_or_else(|| ProviderError::NotFound(to.clone()))
    }
}
