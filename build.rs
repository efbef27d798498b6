fn main() {
    // Writes `built.rs` into OUT_DIR; included by `crate::build_info`
    built::write_built_file().expect("Failed to generate build info");
}
