use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Command;

const PROBE: &str = "roundtrip-bpf";

#[derive(Parser, Debug)]
#[command(
    name = "xtask",
    version,
    about = "Build tasks for the httpscope RoundTrip probe",
    propagate_version = true
)]
struct XtaskCli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Build the probe into ebpf/obj/roundtrip-bpf.{bpfel,bpfeb}.o
    BuildEbpf {
        /// Nightly toolchain used for -Z build-std
        #[arg(long, default_value = "nightly-2024-07-01")]
        toolchain: String,
        /// Byte order(s) to build
        #[arg(long, value_enum, default_value_t = Endian::Auto)]
        target: Endian,
        /// Architecture whose pt_regs layout the probe reads
        #[arg(long, value_enum, default_value_t = Arch::Auto)]
        arch: Arch,
        /// Do not install the rust-src component
        #[arg(long)]
        skip_rust_src: bool,
    },
    /// Remove built objects and the probe's target dir
    CleanEbpf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Endian {
    /// Host byte order
    Auto,
    Bpfel,
    Bpfeb,
    Both,
}

impl Endian {
    fn triples(self) -> &'static [&'static str] {
        match self {
            Endian::Auto if cfg!(target_endian = "little") => &["bpfel-unknown-none"],
            Endian::Auto => &["bpfeb-unknown-none"],
            Endian::Bpfel => &["bpfel-unknown-none"],
            Endian::Bpfeb => &["bpfeb-unknown-none"],
            Endian::Both => &["bpfel-unknown-none", "bpfeb-unknown-none"],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Arch {
    /// Host architecture
    Auto,
    #[value(name = "x86_64")]
    X86_64,
    Aarch64,
}

impl Arch {
    /// Value of the `bpf_target_arch` cfg.
    fn cfg_value(self) -> Result<&'static str> {
        match self {
            Arch::X86_64 => Ok("x86_64"),
            Arch::Aarch64 => Ok("aarch64"),
            Arch::Auto => match std::env::consts::ARCH {
                "x86_64" => Ok("x86_64"),
                "aarch64" => Ok("aarch64"),
                other => bail!("no Go register mapping for host architecture '{}'", other),
            },
        }
    }
}

/// Where the probe crate and its outputs live.
struct Layout {
    probe_crate: PathBuf,
    obj_dir: PathBuf,
}

impl Layout {
    /// Search upward from the current directory for the workspace root.
    fn discover() -> Result<Self> {
        let cwd = std::env::current_dir()?;
        let root = cwd
            .ancestors()
            .take(8)
            .find(|dir| dir.join("Cargo.toml").exists() && dir.join("httpscope-process").is_dir())
            .ok_or_else(|| anyhow!("no httpscope workspace above {}", cwd.display()))?;
        let ebpf = root.join("httpscope-process").join("ebpf");
        Ok(Self {
            probe_crate: ebpf.join(PROBE),
            obj_dir: ebpf.join("obj"),
        })
    }

    fn object_for(&self, triple: &str) -> PathBuf {
        let suffix = triple.split('-').next().unwrap_or(triple);
        self.obj_dir.join(format!("{}.{}.o", PROBE, suffix))
    }

    fn release_dir(&self, triple: &str) -> PathBuf {
        self.probe_crate.join("target").join(triple).join("release")
    }
}

fn run(cmd: &mut Command) -> Result<()> {
    let status = cmd.status().with_context(|| format!("cannot spawn {:?}", cmd))?;
    if !status.success() {
        bail!("{:?} exited with {}", cmd, status);
    }
    Ok(())
}

fn has_elf_magic(path: &Path) -> Result<bool> {
    let mut magic = [0u8; 4];
    let n = fs::File::open(path)?.read(&mut magic)?;
    Ok(n == 4 && magic == *b"\x7fELF")
}

/// Pull the first object file out of a static archive into `dst`.
fn extract_from_archive(archive: &Path, dst: &Path) -> Result<()> {
    let scratch = tempfile::tempdir()?;
    run(Command::new("ar")
        .arg("x")
        .arg(archive)
        .current_dir(scratch.path()))?;
    let member = fs::read_dir(scratch.path())?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .find(|p| p.extension().is_some_and(|ext| ext == "o"))
        .ok_or_else(|| anyhow!("{} holds no object file", archive.display()))?;
    if !has_elf_magic(&member)? {
        bail!("{} in {} is not ELF", member.display(), archive.display());
    }
    fs::copy(&member, dst)?;
    Ok(())
}

fn build_triple(layout: &Layout, toolchain: &str, triple: &str, arch: &str) -> Result<()> {
    run(Command::new("cargo")
        .arg(format!("+{}", toolchain))
        .args(["build", "--release", "--target", triple, "-Z", "build-std=core"])
        .env(
            "CARGO_ENCODED_RUSTFLAGS",
            format!("--cfg\x1fbpf_target_arch=\"{}\"", arch),
        )
        .current_dir(&layout.probe_crate))?;

    let out = layout.object_for(triple);
    let release = layout.release_dir(triple);
    let bin = release.join(PROBE);
    let archive = release.join(format!("lib{}.a", PROBE.replace('-', "_")));

    if bin.exists() {
        if !has_elf_magic(&bin)? {
            bail!("{} is not ELF", bin.display());
        }
        fs::copy(&bin, &out)?;
    } else if archive.exists() {
        extract_from_archive(&archive, &out)?;
    } else {
        bail!("cargo produced no {} artifact in {}", PROBE, release.display());
    }
    println!("Wrote {}", out.display());
    Ok(())
}

fn build_ebpf(toolchain: &str, target: Endian, arch: Arch, skip_rust_src: bool) -> Result<()> {
    let layout = Layout::discover()?;
    let arch = arch.cfg_value()?;

    let mut install = Command::new("rustup");
    install.args(["toolchain", "install", toolchain]);
    if !skip_rust_src {
        install.args(["--component", "rust-src"]);
    }
    // Already-installed toolchains make rustup fail on some versions
    let _ = install.status();

    fs::create_dir_all(&layout.obj_dir)?;
    for triple in target.triples() {
        println!("Building {} for {} ({} registers)", PROBE, triple, arch);
        build_triple(&layout, toolchain, triple, arch)?;
    }
    Ok(())
}

fn clean_ebpf() -> Result<()> {
    let layout = Layout::discover()?;
    for triple in Endian::Both.triples() {
        let _ = fs::remove_file(layout.object_for(triple));
    }
    let target_dir = layout.probe_crate.join("target");
    let _ = fs::remove_dir_all(&target_dir);
    println!("Removed {} and built objects", target_dir.display());
    Ok(())
}

fn main() -> Result<()> {
    match XtaskCli::parse().cmd {
        Cmd::BuildEbpf {
            toolchain,
            target,
            arch,
            skip_rust_src,
        } => build_ebpf(&toolchain, target, arch, skip_rust_src),
        Cmd::CleanEbpf => clean_ebpf(),
    }
}
