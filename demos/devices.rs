use reading_assistant_client::utils::device;

fn main() -> anyhow::Result<()> {
    println!("Input devices:\n{}", device::get_available_inputs()?);
    println!("Output devices:\n{}", device::get_available_outputs()?);
    Ok(())
}
