// Copyright 2024 Kevin Ludwig
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Command-line entry point: `defragment`, `fragment`, and `check` over a
//! FAT32 image file. `defragment` and `fragment` operate on a copy of the
//! input image, suffixed `_defragmented` / `_fragmented`; `check` reads the
//! original without mutating it.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use defat_fat::{bpb::Bpb, cluster_manager::is_fragmented, dir::DirectoryParser, fat_table::ClusterTable};
use defat_storage_std::FileStorage;

#[derive(Parser)]
#[command(name = "defat", about = "FAT32 cluster defragmentation and fragmentation engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Relocate every fragmented file's clusters into a contiguous run.
    Defragment { image_path: PathBuf },
    /// Scatter one file's clusters into randomly chosen free clusters.
    Fragment { image_path: PathBuf, file_path: String },
    /// Print all files, flagging fragmented ones, without mutating the image.
    Check { image_path: PathBuf },
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Defragment { image_path } => run_defragment(&image_path),
        Command::Fragment { image_path, file_path } => run_fragment(&image_path, &file_path),
        Command::Check { image_path } => run_check(&image_path),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn working_copy(image_path: &Path, suffix: &str) -> std::io::Result<PathBuf> {
    let stem = image_path.file_stem().unwrap_or_default().to_string_lossy();
    let extension = image_path.extension().map(|e| e.to_string_lossy().to_string());
    let file_name = match extension {
        Some(ext) => format!("{stem}_{suffix}.{ext}"),
        None => format!("{stem}_{suffix}"),
    };
    let target = image_path.with_file_name(file_name);
    std::fs::copy(image_path, &target)?;
    Ok(target)
}

fn run_defragment(image_path: &Path) -> defat_err::Result<()> {
    let target = working_copy(image_path, "defragmented")?;
    println!("working on copy: {}", target.display());

    let storage = FileStorage::new(&target);
    let bpb = Bpb::read(&storage)?;
    let relocated = defat_fat::defragment(&storage, bpb.root_cluster)?;

    if relocated.is_empty() {
        println!("no fragmented files found");
    } else {
        for path in &relocated {
            println!("defragmented: {path}");
        }
    }
    Ok(())
}

fn run_fragment(image_path: &Path, file_path: &str) -> defat_err::Result<()> {
    let target = working_copy(image_path, "fragmented")?;
    println!("working on copy: {}", target.display());

    let storage = FileStorage::new(&target);
    let bpb = Bpb::read(&storage)?;
    defat_fat::fragment(&storage, bpb.root_cluster, file_path)?;

    println!("fragmented: {file_path}");
    Ok(())
}

fn run_check(image_path: &Path) -> defat_err::Result<()> {
    let storage = FileStorage::new(image_path);
    let bpb = Bpb::read(&storage)?;
    let table = ClusterTable::read(&storage, bpb)?;
    let parser = DirectoryParser::new(&storage, &table);
    let files = parser.get_all_files(bpb.root_cluster);

    println!("all files:");
    for file in &files {
        println!("  {} ({} bytes)", file.path, file.size);
    }

    let fragmented: Vec<_> = files
        .iter()
        .filter(|f| is_fragmented(&table.get_cluster_chain(f.starting_cluster)))
        .collect();

    if fragmented.is_empty() {
        println!("fragmented files: none");
    } else {
        println!("fragmented files:");
        for file in fragmented {
            println!("  {}", file.path);
        }
    }
    Ok(())
}
