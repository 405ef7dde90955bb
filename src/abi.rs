//! Type-safe contract bindings for the pool, token and factory interfaces,
//! plus the event topic constants the log filter is scoped to.

use ethers::contract::abigen;
use ethers::contract::EthEvent;
use ethers::types::H256;
use once_cell::sync::Lazy;

abigen!(
    AmmPair,
    r#"[
        event Sync(uint112 reserve0, uint112 reserve1)
        event Swap(address indexed sender, uint256 amount0In, uint256 amount1In, uint256 amount0Out, uint256 amount1Out, address indexed to)
        function token0() external view returns (address)
        function token1() external view returns (address)
        function factory() external view returns (address)
        function getReserves() external view returns (uint112 reserve0, uint112 reserve1, uint32 blockTimestampLast)
    ]"#,
);

abigen!(
    Erc20Token,
    r#"[
        function name() external view returns (string)
        function symbol() external view returns (string)
        function decimals() external view returns (uint8)
    ]"#,
);

abigen!(
    AmmFactory,
    r#"[
        function getPair(address tokenA, address tokenB) external view returns (address pair)
    ]"#,
);

/// Topic0 of the pool's reserve-update event.
pub static SYNC_TOPIC: Lazy<H256> = Lazy::new(SyncFilter::signature);

/// Topic0 of the pool's trade event.
pub static SWAP_TOPIC: Lazy<H256> = Lazy::new(SwapFilter::signature);
