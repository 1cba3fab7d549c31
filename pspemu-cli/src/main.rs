// CLI application
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pspemu_core::bios::modules::SceRtc;
use pspemu_core::bios::FunctionRegistry;
use pspemu_core::debugger::symbols::Method;
use pspemu_core::debugger::SymbolDatabase;
use pspemu_core::disasm;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pspemu")]
#[command(about = "PSP emulator inspection tools")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Disassemble a raw Allegrex code image
    Disasm {
        /// Path to the code image
        #[arg(short, long)]
        image: PathBuf,

        /// Load address of the first word
        #[arg(short, long, value_parser = parse_address, default_value = "0x08800000")]
        base: u32,

        /// Name to record the function under in the symbol view
        #[arg(short, long, default_value = "entry")]
        name: String,

        /// Dump the resulting symbols as JSON instead of a listing
        #[arg(long)]
        json: bool,
    },
    /// List the registered BIOS modules and their functions
    Modules,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Disasm {
            image,
            base,
            name,
            json,
        } => {
            let pb = create_progress_bar("Disassembling code image...");
            let bytes = std::fs::read(&image)?;
            let body = disasm::disassemble_method(base, &bytes)?;
            pb.finish_with_message(format!(
                "{} instructions, {} labels",
                body.total_lines,
                body.labels.len()
            ));

            if json {
                let mut db = SymbolDatabase::new();
                let length = body.length;
                db.begin_update().add_method(Method {
                    address: base,
                    length,
                    name,
                    body: Some(body),
                });
                println!("{}", db.export_json()?);
            } else {
                print_listing(&body);
            }
        }
        Commands::Modules => {
            let mut registry = FunctionRegistry::new();
            registry.register_module(Box::new(SceRtc));

            let mut functions: Vec<_> = registry.functions().collect();
            functions.sort_by_key(|function| (function.token.module, function.descriptor.name));
            for function in functions {
                println!(
                    "{:<10} 0x{:08X} {:<40} {}",
                    function.token.module,
                    function.descriptor.nid,
                    function.descriptor.name,
                    if function.descriptor.implemented {
                        ""
                    } else {
                        "(NI)"
                    }
                );
            }
        }
    }

    Ok(())
}

fn print_listing(body: &disasm::MethodBody) {
    if body.locals_size != 0 {
        println!("; locals: {} words", body.locals_size);
    }
    for instruction in &body.instructions {
        if let Some(label) = body.label_at(instruction.address) {
            println!("{}:", label.name);
        }
        println!(
            "  {:08X}: {:08X}  {}",
            instruction.address, instruction.code, instruction
        );
    }
}

fn parse_address(text: &str) -> Result<u32, String> {
    let trimmed = text.trim();
    let parsed = match trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => trimmed.parse(),
    };
    parsed.map_err(|error| format!("bad address {:?}: {}", text, error))
}

fn create_progress_bar(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(message.to_string());
    pb
}
