use atlas_aterm::Protected;
use atlas_aterm::TermId;
use atlas_aterm::TermPool;

fn main() {
    let pool = TermPool::new();
    let mut container = Protected::new(&pool, Vec::<TermId>::new());

    // Add stuff to the container to test soundness
    {
        let mut write = container.write();
        let id = write.protect(&pool.create_int(1));
        write.push(id);
    }

    // This should not compile, the reference outlives the write guard
    let t = {
        let write = container.write();
        write.term(write[0])
    };
    println!("Term: {:?}", t);

    // This should not compile either, the container is changed while the reference exists
    let read = container.read();
    let t = read.term(read[0]);
    drop(read);
    container.write().clear();
    println!("Term: {:?}", t);
}
