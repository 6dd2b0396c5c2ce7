//! Entry point of the UDP Relay service.

fn main() -> Result<(), ts3_relay::cli::Failure> {
    ts3_relay::run()
}
