/// Bundling is handled entirely by nih_plug_xtask:
///
///   cargo xtask bundle loveless-delay-v2 --release
///
/// Builds the cdylib and packages it as `target/bundled/Loveless Delay II.vst3`
/// and `.clap`.
fn main() -> nih_plug_xtask::Result<()> {
    nih_plug_xtask::main()
}
