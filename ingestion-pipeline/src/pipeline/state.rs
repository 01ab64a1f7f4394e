use state_machines::state_machine;

state_machine! {
    name: DocumentMachine,
    state: DocumentState,
    initial: Ready,
    states: [Ready, Chunking, Documenting, Batching, Completed, Failed, Cancelled],
    events {
        start_chunking { transition: { from: Ready, to: Chunking } }
        record_document { transition: { from: Chunking, to: Documenting } }
        start_batching { transition: { from: Documenting, to: Batching } }
        finish { transition: { from: Batching, to: Completed } }
        abort {
            transition: { from: Ready, to: Failed }
            transition: { from: Chunking, to: Failed }
            transition: { from: Documenting, to: Failed }
            transition: { from: Batching, to: Failed }
        }
        cancel {
            transition: { from: Ready, to: Cancelled }
            transition: { from: Chunking, to: Cancelled }
            transition: { from: Documenting, to: Cancelled }
            transition: { from: Batching, to: Cancelled }
        }
    }
}

pub fn ready() -> DocumentMachine<(), Ready> {
    DocumentMachine::new(())
}
