fn main() -> anyhow::Result<()> {
    technicals_lib::run()
}
