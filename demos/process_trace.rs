use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    nettraces::example_apps::run_process_trace(std::env::args().skip(1))
}
