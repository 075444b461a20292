fn main() {
    // Operator tooling is not implemented yet; the field application embeds
    // the backend crate through its FFI surface.
    eprintln!("collection-ledger-cli: no commands available yet");
}
