//! Build script for partition-fuser
//!
//! Generates Rust code from the ONNX protobuf definitions using prost-build.

use std::env;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let proto_path = PathBuf::from("proto/onnx.proto");

    if !proto_path.exists() {
        return Err(format!(
            "ONNX proto file not found at: {}\n\
             Please ensure proto/onnx.proto exists.",
            proto_path.display()
        )
        .into());
    }

    // Fall back to the vendored compiler when no system protoc is configured
    if env::var_os("PROTOC").is_none() {
        env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }

    let out_dir = PathBuf::from(env::var("OUT_DIR")?);

    let mut config = prost_build::Config::new();

    // BTreeMap keeps generated map fields deterministic
    config.btree_map(["."]);
    config.out_dir(&out_dir);
    config.compile_protos(&[&proto_path], &["proto/"])?;

    println!("cargo:rerun-if-changed=proto/onnx.proto");
    println!("cargo:rerun-if-changed=build.rs");

    Ok(())
}
