use anyhow::Result;

use otley::btree::Otley;
use otley::btree::Property;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
struct Event {
    id: i32,
    magnitude: i64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Index Event records by id, four entries per page
    let property = Property::new("hello.idx", "metadata.json", "index.dat", 4, 4, true)?;
    let tree = Otley::try_new(property, |e: &Event| e.id).await?;

    // Make sure the tree starts out without event 3
    assert!(!tree.contains(&3).await);

    // Insert event 3
    let event = Event {
        id: 3,
        magnitude: 70,
    };
    tree.insert(event).await?;

    // Make sure we can find it again
    assert!(tree.contains(&3).await);
    assert_eq!(tree.search(&3).await?, vec![event]);

    // Remove it
    tree.remove(&3).await?;
    assert!(!tree.contains(&3).await);

    std::fs::remove_dir_all("hello.idx")?;
    Ok(())
}
