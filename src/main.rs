fn main() -> anyhow::Result<()> {
    cogniflow_lib::run()
}
