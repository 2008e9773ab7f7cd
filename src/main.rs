fn main() -> anyhow::Result<()> {
    pullctl::logging::init();
    pullctl::cli::run()
}
