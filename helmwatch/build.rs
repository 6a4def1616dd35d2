use prost::Message;
use std::path::PathBuf;

fn main() {
    let out_dir = std::env::var("OUT_DIR").unwrap();
    let out_dir = PathBuf::from(out_dir);

    let ifiles = ["proto/helmwatch.proto"];
    let include_dirs = ["proto"];
    let fd_path = out_dir.join("helmwatch_descriptor.bin");

    let fds = protox::compile(ifiles, include_dirs).unwrap();
    std::fs::write(&fd_path, fds.encode_to_vec()).unwrap();

    tonic_build::configure()
        .out_dir(out_dir)
        .compile_fds(fds)
        .unwrap();

    println!("cargo:rerun-if-changed=proto/helmwatch.proto");
}
