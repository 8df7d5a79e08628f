//! Connects to a remote `Calculator` object and calls its `add` function.
//! Point `--ior` at the string an `Rpc` server printed when it activated
//! the object (`NPRPC:...`).

use nprpc::RpcBuilder;
use nprpc_sdk::Stub;

struct Calculator(Stub);

impl Calculator {
    async fn add(&self, a: i32, b: i32) -> Result<i32, nprpc_sdk::StubError> {
        let mut args = Vec::with_capacity(8);
        args.extend_from_slice(&a.to_le_bytes());
        args.extend_from_slice(&b.to_le_bytes());

        let reply = self.0.invoke(0, 0, &args).await?;
        Ok(i32::from_le_bytes(reply[..4].try_into().unwrap()))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let ior = std::env::args().nth(1).expect("usage: hello <ior>");

    let rpc = RpcBuilder::new().build()?;
    let calculator = Calculator(Stub::from_ior(rpc, &ior)?);

    let sum = calculator.add(2, 3).await?;
    println!("2 + 3 = {sum}");

    Ok(())
}
