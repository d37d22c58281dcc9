fn main() {
    centrifuge_pipeline::cli::run();
}
