fn main() -> Result<(), Box<dyn std::error::Error>> {
    heysol::cli::main()
}
