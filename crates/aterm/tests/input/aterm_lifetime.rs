use atlas_aterm::Term;
use atlas_aterm::TermPool;

fn main() {
    let pool = TermPool::new();
    let f = pool.create_symbol("f", 1);

    let term = {
        let t = pool.create_term(&f, &[pool.create_int(1)]);
        t.arg(0)
    };

    // Have some side effect
    println!("Term: {:?}", term);
}
