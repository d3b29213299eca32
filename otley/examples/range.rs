use anyhow::Result;

use futures::StreamExt;
use otley::btree::Direction;
use otley::btree::Otley;
use otley::btree::Property;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
struct Reading {
    id: i32,
    value: i64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let property = Property::new("range.idx", "metadata.json", "index.dat", 4, 4, true)?;
    let tree = Otley::try_new(property, |r: &Reading| r.id).await?;

    for id in 1..=50 {
        tree.insert(Reading {
            id,
            value: (id * id) as i64,
        })
        .await?;
    }

    let slice = tree.between(&10, &15).await?;
    println!(
        "between 10 and 15: {:?}",
        slice.iter().map(|r| r.id).collect::<Vec<_>>()
    );

    let tail = tree.above(&45).await?;
    println!(
        "above 45: {:?}",
        tail.iter().map(|r| r.id).collect::<Vec<_>>()
    );

    let head = tree.below(&5).await?;
    println!(
        "below 5: {:?}",
        head.iter().map(|r| r.id).collect::<Vec<_>>()
    );

    // The leaf chain also runs backwards
    let largest = tree
        .keys(Direction::Descending)
        .await
        .take(10)
        .collect::<Vec<i32>>()
        .await;
    println!("ten largest keys: {largest:?}");

    std::fs::remove_dir_all("range.idx")?;
    Ok(())
}
