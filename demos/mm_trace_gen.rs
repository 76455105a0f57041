use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    nettraces::example_apps::run_mm_trace_gen(std::env::args().skip(1))
}
