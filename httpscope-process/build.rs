fn main() {
    use std::path::{Path, PathBuf};
    use std::{env, fs};

    println!("cargo:rerun-if-changed=ebpf/obj/roundtrip-bpf.bpfel.o");
    println!("cargo:rerun-if-changed=ebpf/obj/roundtrip-bpf.bpfeb.o");

    // Missing prebuilt objects are tolerated: an empty placeholder is embedded
    // instead and loading reports the object as missing at runtime.
    let manifest = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    fs::create_dir_all(&out_dir).expect("create OUT_DIR failed");

    fn copy_elf_or_empty(src: &Path, dst: &Path, label: &str) {
        match fs::read(src) {
            Ok(bytes) if bytes.starts_with(b"\x7fELF") => {
                fs::write(dst, bytes).expect("write OUT_DIR file failed");
            }
            Ok(_) => {
                fs::write(dst, []).expect("create placeholder failed");
                println!(
                    "cargo:warning=Invalid {} object at {} (not ELF); the probe cannot be loaded.",
                    label,
                    src.display()
                );
            }
            Err(_) => {
                fs::write(dst, []).expect("create placeholder failed");
                println!(
                    "cargo:warning=Missing {} object at {}; build it with ebpf/xtask (build-ebpf).",
                    label,
                    src.display()
                );
            }
        }
    }

    let little_endian = env::var("CARGO_CFG_TARGET_ENDIAN").map_or(true, |e| e == "little");
    for (suffix, label) in [("bpfel", "little-endian"), ("bpfeb", "big-endian")] {
        let name = format!("roundtrip-bpf.{suffix}.o");
        let src = manifest.join("ebpf/obj").join(&name);
        let dst = out_dir.join(&name);
        // Only the target's own endianness is required.
        let needed = (suffix == "bpfel") == little_endian;
        if needed || src.exists() {
            copy_elf_or_empty(&src, &dst, label);
        } else {
            fs::write(&dst, []).expect("create placeholder failed");
        }
    }
}
