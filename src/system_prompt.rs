//! System prompt: ordering policy followed by the menu catalog

use std::fmt::Write;

/// Spending limit the bot recommends within
pub const BUDGET_DOLLARS: f64 = 22.0;

/// Most items suggested in one reply
pub const MAX_SUGGESTIONS: usize = 5;

/// A catalog line
#[derive(Debug, Clone, Copy)]
pub struct CatalogItem {
    pub name: &'static str,
    pub price: f64,
    pub description: &'static str,
}

pub const CATALOG: &[CatalogItem] = &[
    CatalogItem {
        name: "Harvest Bowl",
        price: 48.50,
        description: "Roasted chicken, roasted sweet potatoes, apples, goat cheese, roasted almonds, wild rice, shredded kale, and balsamic vinaigrette",
    },
    CatalogItem {
        name: "Chicken Pesto Parm",
        price: 8.75,
        description: "Roasted chicken, spicy broccoli, tomatoes, shaved parmesan, za'atar breadcrumbs, herbed quinoa, baby spinach, sweetgreen hot sauce, and pesto vinaigrette",
    },
    CatalogItem {
        name: "Miso Glazed Salmon",
        price: 5.95,
        description: "Miso glazed salmon, avocado, cucumbers, pickled onions, crispy onions, white rice, nori sesame seasoning, and spicy cashew",
    },
    CatalogItem {
        name: "Crispy Rice Bowl",
        price: 23.75,
        description: "Blackened chicken, raw carrots, shredded cabbage, cucumbers, cilantro, roasted almonds, crispy rice, wild rice, arugula, lime squeeze, and spicy cashew",
    },
    CatalogItem {
        name: "Hot Honey Chicken",
        price: 22.50,
        description: "Blackened chicken, warm roasted sweet potatoes, veg slaw, crispy onions, herbed quinoa, and hot honey mustard sauce",
    },
    CatalogItem {
        name: "Caramelized Garlic Steak",
        price: 20.95,
        description: "Grass-fed caramelized garlic steak, warm roasted sweet potatoes, spicy broccoli, tomatoes, wild rice, and pesto vinaigrette",
    },
    CatalogItem {
        name: "Chicken Avocado Ranch",
        price: 18.25,
        description: "Blackened chicken, avocado, pickled onions, apples, tortilla chips, white rice, chopped romaine, and green goddess ranch",
    },
    CatalogItem {
        name: "Shroomami",
        price: 17.95,
        description: "Roasted tofu, warm portobello mix, cucumbers, basil, shredded cabbage, roasted almonds, wild rice, shredded kale, and miso sesame ginger",
    },
    CatalogItem {
        name: "Fish Taco",
        price: 21.75,
        description: "Arugula, herbed quinoa, cilantro, shredded cabbage, tortilla chips, avocado, miso glazed salmon, lime cilantro jalapeño vinaigrette, and sweetgreen hot sauce",
    },
    CatalogItem {
        name: "Autumn Harvest Bowl",
        price: 19.95,
        description: "Blackened chicken, maple glazed Brussels sprouts, roasted sweet potatoes, apples, goat cheese, roasted almonds, wild rice, shredded kale, and balsamic vinaigrette",
    },
    CatalogItem {
        name: "Steakhouse Chopped",
        price: 20.75,
        description: "Grass-fed caramelized garlic steak, crispy onions, tomatoes, blue cheese, shredded cabbage, herbed quinoa, chopped romaine, and green goddess ranch",
    },
];

const POLICY: &str = r"You are a bot that helps users decide which menu items to order that fits their preferences and a budget of ${budget}.

First, you should ask questions to get the user's name.

After getting the user's name, please use the user's name and ask what food preferences they have.

For example, a user may say 'no cheese' or 'no cilantro'. A user may also say that they like 'chicken'.

If the user replies with food preferences, then ask them if they have any more food preferences to make sure the user told us everything.";

const TOOLS_NOTE: &str = r"When you suggest items, call list_menu_items so the user sees them as cards. Call show_menu_item to present a single item and show_purchase when the user wants to order.";

/// Build the system instruction.
pub fn build_system_prompt(tools_enabled: bool) -> String {
    let budget = format!("{BUDGET_DOLLARS:.0}");
    let mut prompt = POLICY.replace("{budget}", &budget);

    prompt.push_str("\n\nHere are the menu items from Sweetgreen:\n");
    for item in CATALOG {
        let _ = writeln!(
            prompt,
            "- {} (${:.2}): {}",
            item.name, item.price, item.description
        );
    }

    let _ = write!(
        prompt,
        "\nPlease use the user's food preferences to only suggest items that 1) match the food preferences and 2) have a price less than ${BUDGET_DOLLARS:.2}.\n\n\
         Please return the answer in the following format:\n\n\
         [insert food name] | [insert price] | description;\n\n\
         Do not list more than {MAX_SUGGESTIONS} items at once."
    );

    if tools_enabled {
        prompt.push_str("\n\n");
        prompt.push_str(TOOLS_NOTE);
    }
    prompt
}
