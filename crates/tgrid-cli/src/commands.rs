use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use anyhow::Context;
use colored::Colorize;
use serde::Serialize;
use tgrid_mapping::{
    AssociationShape, Discriminator, DiscriminatorBearing, Identifiable, MappingDocument,
    Mappings, OptimisticLockStyle, RowLocatorKind, Versionable,
};
use tgrid_types::AssociationDescriptor;
use tracing::debug;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Validate(args) => cmd_validate(args),
        Command::Describe(args) => cmd_describe(args),
    }
}

fn load(path: &Path) -> anyhow::Result<Mappings> {
    let mappings = MappingDocument::load(path)
        .and_then(MappingDocument::build)
        .with_context(|| format!("invalid mapping document {}", path.display()))?;
    debug!(
        path = %path.display(),
        entities = mappings.entity_count(),
        collections = mappings.collection_count(),
        "mapping loaded"
    );
    Ok(mappings)
}

fn cmd_validate(args: ValidateArgs) -> anyhow::Result<()> {
    let mappings = match load(&args.path) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("{} {}", "✗".red().bold(), args.path.display());
            return Err(e);
        }
    };
    println!(
        "{} {} is valid: {} entities, {} collections",
        "✓".green().bold(),
        args.path.display().to_string().bold(),
        mappings.entity_count(),
        mappings.collection_count(),
    );
    Ok(())
}

fn cmd_describe(args: DescribeArgs) -> anyhow::Result<()> {
    let mappings = load(&args.path)?;
    let description = Description::of(&mappings);
    match args.format {
        OutputFormat::Text => print!("{}", description.render_text()),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&description)?),
    }
    Ok(())
}

// ---- Description ----

#[derive(Debug, Serialize)]
pub struct Description {
    pub entities: Vec<EntityDescription>,
    pub collections: Vec<CollectionDescription>,
}

#[derive(Debug, Serialize)]
pub struct EntityDescription {
    pub name: String,
    pub table: String,
    pub id_columns: Vec<String>,
    pub version_column: Option<String>,
    pub optimistic_lock: OptimisticLockStyle,
    pub discriminator: Option<Discriminator>,
    pub reverse_indexes: BTreeMap<String, AssociationDescriptor>,
}

#[derive(Debug, Serialize)]
pub struct CollectionDescription {
    pub role: String,
    pub owner: String,
    pub descriptor: AssociationDescriptor,
    pub row_key_columns: Vec<String>,
    pub locator: RowLocatorKind,
    pub shape: &'static str,
    pub mirror: Option<AssociationDescriptor>,
    pub inverse: bool,
}

impl Description {
    pub fn of(mappings: &Mappings) -> Self {
        let entities = mappings
            .entities()
            .map(|e| EntityDescription {
                name: e.name().to_string(),
                table: e.table().to_string(),
                id_columns: e.identifier_columns().to_vec(),
                version_column: e.version_column().map(str::to_string),
                optimistic_lock: e.optimistic_lock(),
                discriminator: e.discriminator().cloned(),
                reverse_indexes: e
                    .reverse_indexes()
                    .map(|(p, d)| (p.to_string(), d.as_ref().clone()))
                    .collect(),
            })
            .collect();
        let collections = mappings
            .collections()
            .map(|c| CollectionDescription {
                role: c.role().to_string(),
                owner: c.owner().to_string(),
                descriptor: c.descriptor().as_ref().clone(),
                row_key_columns: c.row_key().columns().to_vec(),
                locator: c.locator(),
                shape: c.shape().name(),
                mirror: match c.shape() {
                    AssociationShape::AssociationTable { mirror, .. } => Some(mirror.as_ref().clone()),
                    _ => None,
                },
                inverse: c.is_inverse(),
            })
            .collect();
        Self { entities, collections }
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for e in &self.entities {
            let _ = writeln!(out, "{} {}", "entity".cyan(), e.name.bold());
            let _ = writeln!(out, "  table: {}  id: [{}]", e.table, e.id_columns.join(", "));
            if let Some(version) = &e.version_column {
                let _ = writeln!(out, "  version: {version} ({:?})", e.optimistic_lock);
            }
            if let Some(d) = &e.discriminator {
                let _ = writeln!(out, "  discriminator: {} = {}", d.column, d.value);
            }
            for (property, descriptor) in &e.reverse_indexes {
                let _ = writeln!(out, "  reverse index {}: {descriptor}", property.yellow());
            }
        }
        for c in &self.collections {
            let _ = writeln!(out, "{} {}", "collection".cyan(), c.role.bold());
            let _ = writeln!(out, "  association: {}", c.descriptor);
            let _ = writeln!(
                out,
                "  row key: [{}]  located by {:?}",
                c.row_key_columns.join(", "),
                c.locator
            );
            let inverse = if c.inverse { " (inverse)" } else { "" };
            let _ = writeln!(out, "  sync: {}{inverse}", c.shape.yellow());
            if let Some(mirror) = &c.mirror {
                let _ = writeln!(out, "  mirror: {mirror}");
            }
        }
        out
    }
}
