fn main() -> anyhow::Result<()> {
    tagify_lib::run()
}
