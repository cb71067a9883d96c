fn main() {
    lexmac::cli::run();
}
