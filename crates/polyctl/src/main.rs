//! polyctl
//!
//! Checks schema documents and shows what the runtime derives from them.

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
use clap::Parser;
use clap::Subcommand;
use polyschema::Schema;
use polywire::Codec;
use polywire::Rpc;
use polywire::SerialDescriptor;
use serde_json::json;
use tracing::debug;

#[derive(Parser)]
#[command(name = "polyctl")]
#[command(about = "Inspect polyrpc schema documents", long_about = None)]
#[command(after_help = r#"EXAMPLES:
    polyctl check api.rpc.json                   Validate a schema document
    polyctl descriptors api.rpc.json             Print derived serializer descriptors
    polyctl descriptors api.rpc.json --json      Same, as JSON
    polyctl request api.rpc.json add '[2, 3]'    Print the framed request for a call
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a schema document and summarize it
    Check {
        path: PathBuf,
    },

    /// Print the serializer descriptor of every model
    Descriptors {
        path: PathBuf,

        /// Output in JSON format
        #[arg(short, long)]
        json: bool,
    },

    /// Type-check call arguments and print the framed request
    Request {
        path: PathBuf,

        method: String,

        /// Arguments as a JSON array, in declaration order
        #[arg(default_value = "[]")]
        args: String,
    },
}

fn main() -> Result<()> {
    polyrun::telemetry::init_tracing_with("warn");
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { path } => check(&path),
        Commands::Descriptors { path, json } => descriptors(&path, json),
        Commands::Request { path, method, args } => request(&path, &method, &args),
    }
}

fn load(path: &Path) -> Result<Schema> {
    debug!(path = %path.display(), "loading schema");
    Schema::from_path(path).with_context(|| format!("{}", path.display()))
}

fn check(path: &Path) -> Result<()> {
    let schema = load(path)?;
    println!(
        "{}: ok ({} method(s), {} event(s), {} model(s))",
        schema.name(),
        schema.methods().len(),
        schema.events().len(),
        schema.models().len()
    );
    for method in schema.methods() {
        let params: Vec<String> = method.parameters.iter().map(|p| format!("{}: {}", p.name, p.ty)).collect();
        println!("  method {}({}) -> {}", method.name, params.join(", "), method.return_type);
    }
    for event in schema.events() {
        let params: Vec<String> = event
            .parameters
            .iter()
            .map(|p| {
                let marker = if p.is_dispatch {
                    "dispatch "
                } else if p.is_target {
                    "target "
                } else {
                    ""
                };
                format!("{}{}: {}", marker, p.value.name, p.value.ty)
            })
            .collect();
        println!("  event  {}({}) -> {}", event.name, params.join(", "), event.return_type);
    }
    Ok(())
}

fn descriptors(path: &Path, as_json: bool) -> Result<()> {
    let schema = Arc::new(load(path)?);
    let codec = Codec::json(schema);

    if as_json {
        let all: Vec<serde_json::Value> = codec.descriptors().iter().map(descriptor_json).collect();
        println!("{}", serde_json::to_string_pretty(&all)?);
        return Ok(());
    }

    for descriptor in codec.descriptors().iter() {
        match descriptor {
            SerialDescriptor::Struct { name, type_parameters, elements, discriminated } => {
                let generics = generics(type_parameters);
                let tag = if *discriminated { " (discriminated)" } else { "" };
                println!("struct {}{}{}", name, generics, tag);
                for (index, element) in elements.iter().enumerate() {
                    println!("  {}: {} {}", index, element.name, element.ty);
                }
            }
            SerialDescriptor::Union { name, discriminator, options } => {
                println!("union {} by \"{}\"", name, discriminator);
                for (value, model) in options {
                    println!("  \"{}\" -> {}", value, model);
                }
            }
            SerialDescriptor::Enum { name, names } => {
                println!("enum {}", name);
                for (ordinal, option) in names.iter().enumerate() {
                    println!("  {} = {}", option, ordinal);
                }
            }
            SerialDescriptor::Inline { name, type_parameters, inner } => {
                println!("inline {}{} = {}", name, generics(type_parameters), inner);
            }
        }
    }
    Ok(())
}

fn request(path: &Path, method: &str, args: &str) -> Result<()> {
    let schema = Arc::new(load(path)?);
    let codec = Codec::json(schema.clone());
    let Some(endpoint) = schema.method(method) else {
        bail!("{} declares no method '{}'", schema.name(), method);
    };

    let types = endpoint.parameter_types();
    let values = codec
        .decode_tuple(&types, args.as_bytes())
        .with_context(|| format!("arguments do not match {}", method))?;
    let bytes = Rpc::new(method, values)?.to_bytes(&codec, &types)?;
    println!("{}", String::from_utf8_lossy(&bytes));
    Ok(())
}

fn generics(type_parameters: &[String]) -> String {
    if type_parameters.is_empty() {
        String::new()
    } else {
        format!("<{}>", type_parameters.join(", "))
    }
}

fn descriptor_json(descriptor: &SerialDescriptor) -> serde_json::Value {
    match descriptor {
        SerialDescriptor::Struct { name, type_parameters, elements, discriminated } => json!({
            "kind": "struct",
            "name": name,
            "typeParameters": type_parameters,
            "elements": elements.iter().map(|e| json!({ "name": e.name, "type": e.ty.to_string() })).collect::<Vec<_>>(),
            "discriminated": discriminated,
        }),
        SerialDescriptor::Union { name, discriminator, options } => json!({
            "kind": "union",
            "name": name,
            "discriminator": discriminator,
            "options": options.iter().map(|(value, model)| json!({ "value": value, "model": model })).collect::<Vec<_>>(),
        }),
        SerialDescriptor::Enum { name, names } => json!({
            "kind": "enum",
            "name": name,
            "ordinals": names,
        }),
        SerialDescriptor::Inline { name, type_parameters, inner } => json!({
            "kind": "inline",
            "name": name,
            "typeParameters": type_parameters,
            "inner": inner.to_string(),
        }),
    }
}
