fn main() -> anyhow::Result<()> {
    smart_alarm_lib::run()
}
